//! Container lifecycle: start a named, detached, auto-removing container and
//! kill it again.
//!
//! [`start`] hands back a [`ContainerLease`]. Releasing the lease kills the
//! container and reports failures; dropping an unreleased lease (a suite
//! step failed and unwound) still kills it, logging rather than raising.

use crate::error::HarnessResult;
use crate::process::{ProcessOutput, run_command};

const DEFAULT_DOCKER_BIN: &str = "docker";
pub const DOCKER_BIN_ENV: &str = "RUNSQL_HARNESS_DOCKER_BIN";

/// Opaque process-lifecycle provider.
pub trait ContainerRuntime {
    /// Launch `name` detached and auto-removing, followed by `args`
    /// (published ports, environment, image reference).
    fn run_detached(&self, name: &str, args: &[String]) -> HarnessResult<ProcessOutput>;

    /// Force-stop `name`. Fails if no such container is running.
    fn kill(&self, name: &str) -> HarnessResult<ProcessOutput>;
}

/// [`ContainerRuntime`] backed by the `docker` command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(mut source: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let program = source(DOCKER_BIN_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DOCKER_BIN.to_owned());
        Self::new(program)
    }

    #[must_use]
    pub(crate) fn run_args(name: &str, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "run".to_owned(),
            "--name".to_owned(),
            name.to_owned(),
            "--rm".to_owned(),
            "--detach".to_owned(),
        ];
        full.extend_from_slice(args);
        full
    }
}

impl ContainerRuntime for DockerCli {
    fn run_detached(&self, name: &str, args: &[String]) -> HarnessResult<ProcessOutput> {
        run_command(&self.program, &Self::run_args(name, args), None)
    }

    fn kill(&self, name: &str) -> HarnessResult<ProcessOutput> {
        run_command(&self.program, &["kill".to_owned(), name.to_owned()], None)
    }
}

/// A running container that is killed when released or dropped.
pub struct ContainerLease<'a> {
    runtime: &'a dyn ContainerRuntime,
    name: String,
    released: bool,
}

/// Start `name` and return the lease guarding it. A non-zero exit from the
/// runtime (name already in use, image unavailable) is returned as-is and
/// leaves nothing to clean up.
pub fn start<'a>(
    runtime: &'a dyn ContainerRuntime,
    name: &str,
    args: &[String],
) -> HarnessResult<ContainerLease<'a>> {
    tracing::info!(container = %name, "starting container");
    let output = runtime.run_detached(name, args)?;
    tracing::debug!(
        container = %name,
        container_id = %output.stdout_text().trim(),
        "container started"
    );
    Ok(ContainerLease {
        runtime,
        name: name.to_owned(),
        released: false,
    })
}

impl ContainerLease<'_> {
    /// Kill the container, surfacing a failing kill to the caller.
    pub fn release(mut self) -> HarnessResult<ProcessOutput> {
        self.released = true;
        tracing::info!(container = %self.name, "stopping container");
        self.runtime.kill(&self.name)
    }
}

impl Drop for ContainerLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(container = %self.name, "run aborted; killing container");
        if let Err(error) = self.runtime.kill(&self.name) {
            tracing::error!(
                container = %self.name,
                error = %error,
                "failed to kill container after aborted run"
            );
        }
    }
}
