//! `tracing` setup for the harness binary.
//!
//! Log lines go to stderr so that stdout stays reserved for the run report.
//! `RUST_LOG` overrides the default filter; `RUST_LOG_FORMAT=json` switches
//! to one JSON object per event.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "runsql_conformance=info";
pub const LOG_FORMAT_ENV: &str = "RUST_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn from_source<F>(mut source: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        match source(LOG_FORMAT_ENV) {
            Some(value) if value.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Filter from an explicit directive string, falling back to the crate
/// default when it is absent or unparsable.
#[must_use]
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let env = |key: &str| std::env::var(key).ok();
    let filter = filter_from(env("RUST_LOG").as_deref());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match LogFormat::from_source(env) {
        LogFormat::Json => {
            let _ = subscriber.json().try_init();
        }
        LogFormat::Text => {
            let _ = subscriber.try_init();
        }
    }
}
