// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Parser, Subcommand};
use schemars::schema_for;
use tracing::{error, info, warn};

use voxgate_core::settings::Settings;

use crate::config;
use crate::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "voxgw.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Starts the gateway
    Serve,
    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Generate a default config file and print it to stdout
    Default,
    /// Generate a JSON schema for the config and print it to stdout
    Schema,
}

/// Log gateway startup information
fn log_startup_info(config: &config::Config, settings: &Settings) {
    info!(
        address = %config.server.address,
        data_dir = %config.data_dir(),
        max_requests = config.limits.max_requests,
        window_seconds = config.limits.window_seconds,
        auth_enabled = settings.auth_enabled(),
        engine_base = ?settings.stream_engine_base,
        "Starting voxgw"
    );
}

/// Handle the "serve" command - start the gateway.
/// Exits the process on error with status code 1.
// Allow eprintln before logging is initialized (CLI output)
#[allow(clippy::disallowed_macros)]
async fn handle_serve_command(config_path: &str) {
    let config_result = match config::load(config_path) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        },
    };

    let _log_guard = match crate::logging::init_logging(&config_result.config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Some(missing_file) = &config_result.file_missing {
        warn!(config_path = %missing_file, "Config file not found, using defaults");
    }

    let settings = Settings::from_env();
    log_startup_info(&config_result.config, &settings);

    if let Err(e) = server::start_server(&config_result.config, settings).await {
        error!(error = %e, "Failed to start gateway");
        std::process::exit(1);
    }
}

/// Handle the "config default" command - print default config to stdout
// Allow println for CLI output to stdout (intentional)
#[allow(clippy::disallowed_macros)]
fn handle_config_default_command() {
    match config::generate_default() {
        Ok(toml_string) => {
            println!("# Default voxgw configuration file");
            println!("{toml_string}");
        },
        Err(e) => {
            eprintln!("Failed to generate default config: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle the "config schema" command - print JSON schema to stdout
#[allow(clippy::disallowed_macros)]
fn handle_config_schema_command() {
    let schema = schema_for!(config::Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to generate config schema: {e}");
            std::process::exit(1);
        },
    }
}

/// Handle CLI commands
pub async fn handle_command(cli: &Cli) {
    match cli.command.as_ref().unwrap_or(&Commands::Serve) {
        Commands::Serve => handle_serve_command(&cli.config).await,
        Commands::Config(ConfigCommands::Default) => handle_config_default_command(),
        Commands::Config(ConfigCommands::Schema) => handle_config_schema_command(),
    }
}
