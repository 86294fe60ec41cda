//! Top-level sequencing: for each backend, start → wait until ready →
//! generic suite → specific suite → stop, strictly one backend at a time.
//!
//! Every resource a backend run acquires (container, scratch directory,
//! embedded database file) is scoped to that run and released on every exit
//! path, including failures.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::container::{self, ContainerRuntime};
use crate::error::HarnessResult;
use crate::fixtures::FixtureLayout;
use crate::invoker::{ExecutorFactory, SqlInvocation};
use crate::profile::BackendProfile;
use crate::readiness::{ReadinessPolicy, wait_until_ready};
use crate::suite::{SuiteContext, SuiteKind, SuiteReport, run_generic_suite, run_specific_suite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarnessOptions {
    pub readiness: ReadinessPolicy,
    /// Keep running the remaining backends after one fails.
    pub keep_going: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
    pub name: String,
    pub status: BackendStatus,
    pub container: Option<String>,
    pub readiness_attempts: Option<u32>,
    pub suites: Vec<SuiteReport>,
    pub elapsed_ms: u64,
    pub error_code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at_rfc3339: String,
    pub finished_at_rfc3339: String,
    pub readiness: ReadinessPolicy,
    pub backends: Vec<BackendReport>,
    /// Backends never attempted because an earlier one failed.
    pub skipped: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.skipped.is_empty()
            && self
                .backends
                .iter()
                .all(|backend| backend.status == BackendStatus::Passed)
    }

    #[must_use]
    pub fn failed_backends(&self) -> Vec<&str> {
        self.backends
            .iter()
            .filter(|backend| backend.status == BackendStatus::Failed)
            .map(|backend| backend.name.as_str())
            .collect()
    }
}

pub struct Harness<R, F> {
    runtime: R,
    executors: F,
    layout: FixtureLayout,
    options: HarnessOptions,
}

impl<R, F> Harness<R, F>
where
    R: ContainerRuntime,
    F: ExecutorFactory,
{
    pub fn new(runtime: R, executors: F, layout: FixtureLayout, options: HarnessOptions) -> Self {
        Self {
            runtime,
            executors,
            layout,
            options,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn executors_mut(&mut self) -> &mut F {
        &mut self.executors
    }

    /// Run every profile in order. Without `keep_going`, the first failing
    /// backend ends the run and the rest are reported as skipped.
    pub fn run_all(&mut self, profiles: &[BackendProfile]) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at_rfc3339 = Utc::now().to_rfc3339();
        tracing::info!(run_id = %run_id, backends = profiles.len(), "starting conformance run");

        let mut backends = Vec::with_capacity(profiles.len());
        let mut skipped = Vec::new();
        for (index, profile) in profiles.iter().enumerate() {
            let report = self.run_backend(profile);
            let failed = report.status == BackendStatus::Failed;
            backends.push(report);
            if failed && !self.options.keep_going {
                skipped.extend(profiles[index + 1..].iter().map(|p| p.name.clone()));
                break;
            }
        }

        let report = RunReport {
            run_id,
            started_at_rfc3339,
            finished_at_rfc3339: Utc::now().to_rfc3339(),
            readiness: self.options.readiness,
            backends,
            skipped,
        };
        tracing::info!(
            run_id = %report.run_id,
            passed = report.passed(),
            failed = ?report.failed_backends(),
            "conformance run finished"
        );
        report
    }

    /// Run one backend; failures are captured in the returned report.
    pub fn run_backend(&mut self, profile: &BackendProfile) -> BackendReport {
        let started = Instant::now();
        let mut report = BackendReport {
            name: profile.name.clone(),
            status: BackendStatus::Failed,
            container: (!profile.is_file_based()).then(|| profile.container_name.clone()),
            readiness_attempts: None,
            suites: Vec::new(),
            elapsed_ms: 0,
            error_code: None,
            error: None,
        };

        tracing::info!(backend = %profile.name, "starting backend test");
        match self.try_run_backend(profile, &mut report) {
            Ok(()) => {
                report.status = BackendStatus::Passed;
                tracing::info!(backend = %profile.name, "done backend test");
            }
            Err(error) => {
                tracing::error!(backend = %profile.name, error = %error, "backend test failed");
                report.error_code = Some(error.error_code().to_owned());
                report.error = Some(error.to_string());
            }
        }
        report.elapsed_ms = crate::process::saturating_duration_ms(started.elapsed());
        report
    }

    fn try_run_backend(
        &mut self,
        profile: &BackendProfile,
        report: &mut BackendReport,
    ) -> HarnessResult<()> {
        profile.validate()?;
        self.layout.preflight(profile)?;

        let scratch_dir = tempfile::Builder::new()
            .prefix(&format!("runsql-{}-", profile.name))
            .tempdir()?;
        let db_file = if profile.is_file_based() {
            let prefix = format!("{}-db-", profile.name);
            Some(tempfile::Builder::new().prefix(&prefix).tempfile()?)
        } else {
            None
        };
        let connection = profile.connection(db_file.as_ref().map(|file| file.path()));
        let executor = self.executors.executor_for(profile, connection)?;

        let lease = match profile.container_run_args() {
            Some(args) => Some(container::start(&self.runtime, &profile.container_name, &args)?),
            None => None,
        };

        if lease.is_some()
            && let Some(probe) = &profile.probe_sql
        {
            report.readiness_attempts = Some(wait_until_ready(
                &profile.name,
                executor.as_ref(),
                &SqlInvocation::sql(probe.as_str()),
                self.options.readiness,
            )?);
        }

        let ctx = SuiteContext {
            backend: &profile.name,
            executor: executor.as_ref(),
            scratch_dir: scratch_dir.path(),
        };

        if let Some(fixtures) = self.layout.generic(profile) {
            let mut suite = SuiteReport::new(SuiteKind::Generic);
            let outcome = run_generic_suite(&ctx, &fixtures, &mut suite);
            report.suites.push(suite);
            outcome?;
        } else {
            tracing::info!(backend = %profile.name, "generic suite skipped");
        }

        if let (Some(fixtures), Some(call)) = (
            self.layout.specific(profile),
            profile.stored_procedure_call.as_deref(),
        ) {
            let mut suite = SuiteReport::new(SuiteKind::Specific);
            let outcome = run_specific_suite(&ctx, &fixtures, call, &mut suite);
            report.suites.push(suite);
            outcome?;
        } else {
            tracing::info!(backend = %profile.name, "specific suite skipped");
        }

        if let Some(lease) = lease {
            lease.release()?;
        }
        Ok(())
    }
}
