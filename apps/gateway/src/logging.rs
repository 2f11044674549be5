// SPDX-FileCopyrightText: © 2025 Voxgate Contributors
//
// SPDX-License-Identifier: MPL-2.0

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::{self, LogFormat};

type DynLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn env_filter_or_level(default_level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

fn make_file_layer(
    non_blocking: tracing_appender::non_blocking::NonBlocking,
    file_level: tracing::Level,
    file_format: LogFormat,
) -> DynLayer {
    match file_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json()
            .with_filter(env_filter_or_level(file_level))
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(env_filter_or_level(file_level))
            .boxed(),
    }
}

/// Initialize logging based on configuration.
///
/// Sets up tracing subscribers for console and/or file logging.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(
    log_config: &config::LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guard = None;
    let mut layers: Vec<DynLayer> = Vec::new();

    if log_config.file_enable {
        let log_path = std::path::Path::new(&log_config.file_path);
        let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let log_filename =
            log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("voxgw.log"));
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log directory {}: {e}", log_dir.display()))?;

        let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let file_level: tracing::Level = log_config.file_level.clone().into();
        layers.push(make_file_layer(non_blocking, file_level, log_config.file_format));
    }

    if log_config.console_enable {
        let console_level: tracing::Level = log_config.console_level.clone().into();
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_filter(env_filter_or_level(console_level))
                .boxed(),
        );
    }

    if !log_config.console_enable && !log_config.file_enable {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_filter(env_filter_or_level(tracing::Level::INFO))
                .boxed(),
        );
        tracing::warn!(
            "Both console and file logging are disabled, falling back to console logging"
        );
    }

    tracing_subscriber::registry().with(layers).init();

    Ok(guard)
}
