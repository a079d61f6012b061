//! Tracing initialization and log-format selection.
//!
//! Mirrors the workspace lineage's observability bootstrap: a single
//! [`init_tracing`] entry point called once at process start by whatever
//! binary embeds this engine (a CLI, a worker process, a test harness). This
//! module has no HTTP-framework dependency — it is pure `tracing` plumbing.

/// Output format for the global tracing subscriber.
///
/// Selected from the `LOG_FORMAT` environment variable. An unset or
/// unrecognized value falls back to [`Pretty`](LogFormat::Pretty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Newline-delimited JSON, one object per event. Intended for production
    /// log sinks that index on field names (`event.kind`, `error.kind`, ...).
    Json,
    /// Human-readable, colorized output for local development.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parse a log format from a string, warning and falling back to
    /// [`Pretty`](LogFormat::Pretty) on anything unrecognized.
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            other => {
                eprintln!("WARNING: unknown LOG_FORMAT={other:?}, falling back to pretty");
                Self::Pretty
            }
        }
    }

    /// Read the format from the `LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT") {
            Ok(val) => Self::parse(&val),
            Err(_) => Self::default(),
        }
    }
}

/// Configuration passed to [`init_tracing`].
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Name of the embedding binary, recorded as a span field on every
    /// event so a shared log sink can separate workers from each other.
    pub service_name: String,
    pub log_format: LogFormat,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            service_name: service_name.into(),
            log_format,
        }
    }

    /// Build a config from the `LOG_FORMAT` environment variable, given a
    /// fixed service name.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        Self::new(service_name, LogFormat::from_env())
    }
}

/// Initialize the global tracing subscriber. Call exactly once per process.
///
/// `RUST_LOG` controls the level filter; if unset, defaults to
/// `"info,ontology_engine=debug"`.
#[cfg(feature = "observability")]
pub fn init_tracing(config: TracingConfig) {
    use tracing_subscriber::{Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ontology_engine=debug".into());

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(service.name = %config.service_name, "tracing initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_returns_json() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    }

    #[test]
    fn parse_pretty_returns_pretty() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    }

    #[test]
    fn parse_unknown_falls_back_to_pretty() {
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Pretty);
    }

    #[test]
    fn default_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn config_new_sets_fields() {
        let config = TracingConfig::new("engine-worker", LogFormat::Json);
        assert_eq!(config.service_name, "engine-worker");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
