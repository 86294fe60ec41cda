use std::path::PathBuf;

use thiserror::Error;

pub type HarnessResult<T> = Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing command `{command}` on PATH")]
    CommandMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {timeout_ms}ms: `{command}`{stderr_suffix}")]
    CommandTimedOut {
        command: String,
        timeout_ms: u64,
        stderr_suffix: String,
    },

    #[error("unable to reach server for backend `{backend}` after {attempts} attempts")]
    Unreachable { backend: String, attempts: u32 },

    #[error(
        "output file {} differs from expected file {}",
        actual.display(),
        expected.display()
    )]
    OutputMismatch { expected: PathBuf, actual: PathBuf },

    #[error("missing fixture at `{0}`")]
    MissingFixture(PathBuf),

    #[error("invalid backend profile: {0}")]
    InvalidProfile(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cannot resolve runsql artifact: {0}")]
    ArtifactUnresolved(String),

    #[error("conformance run failed for: {}", .0.join(", "))]
    RunFailed(Vec<String>),
}

impl HarnessError {
    #[must_use]
    pub fn from_command_failure(command: String, status: i32, stderr: String) -> Self {
        Self::CommandFailed {
            command,
            status,
            stderr_suffix: stderr_suffix(&stderr),
        }
    }

    #[must_use]
    pub fn from_command_timeout(command: String, timeout_ms: u64, stderr: String) -> Self {
        Self::CommandTimedOut {
            command,
            timeout_ms,
            stderr_suffix: stderr_suffix(&stderr),
        }
    }

    /// True for failures of an external process that actually ran. These are
    /// the only errors the readiness poller treats as "not ready yet".
    #[must_use]
    pub const fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::CommandTimedOut { .. }
        )
    }

    /// Stable, machine-readable code for every variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "RH-IO",
            Self::Json(_) => "RH-JSON",
            Self::CommandMissing { .. } => "RH-CMD-MISSING",
            Self::CommandFailed { .. } => "RH-CMD-FAILED",
            Self::CommandTimedOut { .. } => "RH-CMD-TIMEOUT",
            Self::Unreachable { .. } => "RH-UNREACHABLE",
            Self::OutputMismatch { .. } => "RH-MISMATCH",
            Self::MissingFixture(_) => "RH-MISSING-FIXTURE",
            Self::InvalidProfile(_) => "RH-INVALID-PROFILE",
            Self::InvalidRequest(_) => "RH-INVALID-REQUEST",
            Self::ArtifactUnresolved(_) => "RH-ARTIFACT",
            Self::RunFailed(_) => "RH-RUN-FAILED",
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("; stderr: {trimmed}")
    }
}
