//! Log output for the benchmark binaries.
//!
//! Logs go to stderr. Stdout is reserved for the benchmark reports so that they can be piped into
//! other tools.

use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber.
pub fn initialize_tracing(config: &Config) {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = EnvFilter::new(filter_directives(rust_log.as_deref(), config.logging.level));

    tracing_subscriber::registry()
        .with(format_layer(config.logging.format))
        .with(env_filter)
        .init();
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    match format {
        LogFormat::Pretty => layer.with_ansi(true).boxed(),
        LogFormat::Json => layer.json().boxed(),
        _ => layer.with_ansi(false).boxed(),
    }
}

/// Builds the filter directives from `RUST_LOG` and the configured level.
///
/// If `RUST_LOG` is a plain level, it replaces the configured level for our own crates. Any other
/// value is used literally, for users who know which overrides they want. Dependencies only log
/// warnings and errors by default.
fn filter_directives(rust_log: Option<&str>, configured: LevelFilter) -> String {
    let level = match rust_log {
        Some(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from_level(level),
            Err(_) => return value.to_owned(),
        },
        None => configured,
    };

    format!("warn,objperf={level},objperf_client={level}")
}
