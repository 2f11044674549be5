// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Voxgate Core - shared foundations for the speech gateway and engine.
//!
//! - [`error`]: transport-independent error taxonomy and status mapping
//! - [`settings`]: ambient environment settings resolver
//! - [`layout`]: on-disk data directory layout
//! - [`protocol`]: JSON wire types shared by both tiers

pub mod error;
pub mod layout;
pub mod protocol;
pub mod settings;

pub use error::{Result, SpeechError};
pub use layout::DataLayout;
pub use settings::Settings;
