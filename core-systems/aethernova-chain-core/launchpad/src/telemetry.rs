//! Logging bootstrap for hosts embedding the engine.
//!
//! - Text or JSON output, RFC3339 (UTC) timestamps.
//! - EnvFilter: explicit directive string, else `RUST_LOG`, else `info`.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! left to the host process.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directives, e.g. "info,aethernova_launchpad=debug". None reads `RUST_LOG`.
    pub env_filter: Option<String>,
    /// JSON (`true`) or human-readable text (`false`).
    pub json: bool,
    /// Print target, file and line number.
    pub with_targets_and_lines: bool,
    /// ANSI colors (text format only).
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: true,
            with_targets_and_lines: true,
            ansi: false,
        }
    }
}

fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    match &cfg.env_filter {
        Some(s) => EnvFilter::try_new(s.as_str()).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Install the global subscriber. Call once at process start; a second call
/// fails because a global default is already set.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(&cfg);

    let base = fmt::layer()
        .with_target(cfg.with_targets_and_lines)
        .with_file(cfg.with_targets_and_lines)
        .with_line_number(cfg.with_targets_and_lines)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let fmt_layer = if cfg.json {
        base.json()
            .with_ansi(false)
            .with_current_span(true)
            .flatten_event(true)
            .boxed()
    } else {
        base.with_ansi(cfg.ansi).boxed()
    };

    Registry::default().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}
