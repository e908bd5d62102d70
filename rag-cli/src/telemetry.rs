//! Tracing subscriber setup for the `rag` binary.

use anyhow::anyhow;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log line format, selected with `RAG_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` level.
///
/// Logs go to stderr so stdout carries only the answer.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env_value(std::env::var("RAG_LOG_FORMAT").ok().as_deref());
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}
