//! Bounded polling until a freshly started backend accepts connections.
//!
//! The database inside a container starts asynchronously relative to the
//! container itself, so the first probes are expected to fail. Only process
//! failures are retried; anything else (missing `java`, i/o) aborts at once.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::error::{HarnessError, HarnessResult};
use crate::invoker::{SqlExecutor, SqlInvocation};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);
pub const READY_ATTEMPTS_ENV: &str = "RUNSQL_HARNESS_READY_ATTEMPTS";
pub const READY_INTERVAL_ENV: &str = "RUNSQL_HARNESS_READY_INTERVAL_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    #[serde(rename = "interval_ms", serialize_with = "serialize_duration_ms")]
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl ReadinessPolicy {
    pub fn from_source<F>(mut source: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let max_attempts = source(READY_ATTEMPTS_ENV)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let interval = source(READY_INTERVAL_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map_or(DEFAULT_INTERVAL, Duration::from_millis);
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on time spent sleeping between failed probes.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(crate::process::saturating_duration_ms(*duration))
}

/// Probe `backend` with `probe` until it succeeds or the policy's attempt
/// budget is spent. Returns the number of attempts used.
pub fn wait_until_ready(
    backend: &str,
    executor: &dyn SqlExecutor,
    probe: &SqlInvocation,
    policy: ReadinessPolicy,
) -> HarnessResult<u32> {
    for attempt in 1..=policy.max_attempts {
        tracing::info!(
            backend = %backend,
            attempt,
            max_attempts = policy.max_attempts,
            "ping attempt"
        );
        match executor.execute(probe) {
            Ok(_) => {
                tracing::info!(backend = %backend, attempt, "server is ready");
                return Ok(attempt);
            }
            Err(error) if error.is_process_failure() => {
                tracing::debug!(backend = %backend, attempt, error = %error, "probe failed");
                if attempt < policy.max_attempts && !policy.interval.is_zero() {
                    thread::sleep(policy.interval);
                }
            }
            Err(error) => return Err(error),
        }
    }

    Err(HarnessError::Unreachable {
        backend: backend.to_owned(),
        attempts: policy.max_attempts,
    })
}
