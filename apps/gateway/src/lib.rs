// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

pub mod auth;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod connections;
pub mod downloads;
pub mod logging;
pub mod rate_limit;
pub mod server;
pub mod state;

// Re-export commonly used items for convenience
pub use config::Config;
pub use state::AppState;
