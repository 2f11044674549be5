// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

mod cli;
mod config;
mod logging;
mod router;
mod server;
mod state;

#[tokio::main]
async fn main() {
    // Install default crypto provider for Rustls (required for QUIC TLS)
    // This must be done before any TLS operations
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = cli::Cli::parse();
    cli::handle_command(&cli).await;
}
