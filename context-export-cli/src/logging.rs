//! Subscriber setup: an env-filtered console layer in the configured format
//! plus an optional JSON file layer.

use std::fs::{self, OpenOptions};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use context_export_core::{LogFormat, LoggingConfig};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// `RUST_LOG` wins over the configured level; `--verbose` raises the
/// configured level to debug.
fn env_filter(config: &LoggingConfig, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(level.to_lowercase())
        .with_context(|| format!("Invalid log level '{}'", config.level))
}

pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console_output {
        let filter = env_filter(config, verbose)?;
        let console = fmt::layer().with_writer(std::io::stderr);
        let layer = match config.format {
            LogFormat::Json => console.json().with_current_span(true).with_filter(filter).boxed(),
            LogFormat::Pretty => console.pretty().with_filter(filter).boxed(),
            LogFormat::Compact => console.compact().with_filter(filter).boxed(),
        };
        layers.push(layer);
    }

    if let Some(path) = &config.log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let layer = fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .with_filter(env_filter(config, verbose)?)
            .boxed();
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(format = ?config.format, log_file = ?config.log_file, "Logging initialized");
    Ok(())
}
