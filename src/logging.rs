// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Logging
//!
//! Installs the global `tracing` subscriber used by the example binaries.
//! The level comes from `LOG_LEVEL` (overridable with the usual `RUST_LOG`
//! directives) and the output format from `LOG_FORMAT`.

use crate::configs::LoggingConfigs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Machine-readable, one JSON object per event
    Json,
    /// Multi-line human-readable output
    Pretty,
    /// Single-line terminal output
    Compact,
}

impl LogFormat {
    /// Unknown values fall back to `Compact`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    let mut filter = EnvFilter::new(level.to_lowercase());
    // lapin logs every frame at debug
    for directive in ["lapin=warn", "amq_protocol=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    filter
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_logging(cfg: &LoggingConfigs) {
    let registry = tracing_subscriber::registry().with(env_filter(&cfg.level));

    let result = match cfg.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    };

    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats_case_insensitively() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Compact);
    }
}
