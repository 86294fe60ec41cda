//! Invocation of the runsql command line tool.
//!
//! Suites talk to runsql only through the [`SqlExecutor`] capability, so they
//! stay backend-agnostic and can run against a stub. [`CliInvoker`] is the real
//! implementation: `java -cp <runsql jar>:<driver jar> <main class>` followed
//! by the connection parameters and the per-call arguments.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::artifact::ArtifactResolver;
use crate::error::HarnessResult;
use crate::process::{ProcessOutput, run_command_with_timeout};
use crate::profile::{BackendProfile, ConnectionArgs};

pub const DEFAULT_MAIN_CLASS: &str = "runsql.RunSqlMain";
const DEFAULT_JAVA_BIN: &str = "java";
pub const JAVA_BIN_ENV: &str = "RUNSQL_HARNESS_JAVA_BIN";
pub const COMMAND_TIMEOUT_ENV: &str = "RUNSQL_HARNESS_COMMAND_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SqlSource {
    File(PathBuf),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Default,
    Csv,
}

impl FileFormat {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Csv => "csv",
        }
    }
}

/// How runsql groups statements into transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    Auto,
    /// Execute everything, then roll back.
    Rollback,
    /// Commit after every N statements.
    CommitEvery(NonZeroU32),
}

impl TransactionMode {
    #[must_use]
    pub fn to_arg(self) -> String {
        match self {
            Self::Auto => "auto".to_owned(),
            Self::Rollback => "rollback".to_owned(),
            Self::CommitEvery(n) => n.to_string(),
        }
    }
}

/// One runsql call, minus the connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlInvocation {
    pub source: SqlSource,
    pub output: Option<PathBuf>,
    pub file_format: Option<FileFormat>,
    pub batch_size: Option<NonZeroU32>,
    pub transaction_mode: Option<TransactionMode>,
    pub split_statements: Option<bool>,
}

impl SqlInvocation {
    fn new(source: SqlSource) -> Self {
        Self {
            source,
            output: None,
            file_format: None,
            batch_size: None,
            transaction_mode: None,
            split_statements: None,
        }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SqlSource::File(path.into()))
    }

    #[must_use]
    pub fn sql(text: impl Into<String>) -> Self {
        Self::new(SqlSource::Text(text.into()))
    }

    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    #[must_use]
    pub fn file_format(mut self, format: FileFormat) -> Self {
        self.file_format = Some(format);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: NonZeroU32) -> Self {
        self.batch_size = Some(size);
        self
    }

    #[must_use]
    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn split_statements(mut self, split: bool) -> Self {
        self.split_statements = Some(split);
        self
    }

    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = match &self.source {
            SqlSource::File(path) => vec!["--inputfilepath".to_owned(), path.display().to_string()],
            SqlSource::Text(sql) => vec!["--sql".to_owned(), sql.clone()],
        };
        if let Some(path) = &self.output {
            args.push("--outputfilepath".to_owned());
            args.push(path.display().to_string());
        }
        if let Some(format) = self.file_format {
            args.push("--fileformat".to_owned());
            args.push(format.as_str().to_owned());
        }
        if let Some(size) = self.batch_size {
            args.push("--batchsize".to_owned());
            args.push(size.to_string());
        }
        if let Some(mode) = self.transaction_mode {
            args.push("--transactionmode".to_owned());
            args.push(mode.to_arg());
        }
        if let Some(split) = self.split_statements {
            args.push("--splitsqlstatements".to_owned());
            args.push(if split { "t" } else { "f" }.to_owned());
        }
        args
    }
}

/// Something that can run a runsql invocation against one backend.
pub trait SqlExecutor {
    fn execute(&self, invocation: &SqlInvocation) -> HarnessResult<ProcessOutput>;
}

/// Settings shared by every runsql invocation of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliSettings {
    pub java_bin: String,
    pub driver_dir: PathBuf,
    pub main_class: String,
    pub timeout: Option<Duration>,
}

impl CliSettings {
    pub fn from_source<F>(driver_dir: impl Into<PathBuf>, mut source: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let java_bin = source(JAVA_BIN_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_JAVA_BIN.to_owned());
        let timeout = source(COMMAND_TIMEOUT_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        Self {
            java_bin,
            driver_dir: driver_dir.into(),
            main_class: DEFAULT_MAIN_CLASS.to_owned(),
            timeout,
        }
    }
}

#[must_use]
pub fn classpath(runsql_jar: &Path, driver_dir: &Path, artifact_name: &str) -> String {
    format!(
        "{}:{}",
        runsql_jar.display(),
        driver_dir.join(artifact_name).display()
    )
}

/// [`SqlExecutor`] that spawns runsql under a JVM.
#[derive(Debug, Clone)]
pub struct CliInvoker {
    java_bin: String,
    classpath: String,
    main_class: String,
    connection: ConnectionArgs,
    timeout: Option<Duration>,
}

impl CliInvoker {
    #[must_use]
    pub fn new(
        settings: &CliSettings,
        runsql_jar: &Path,
        artifact_name: &str,
        connection: ConnectionArgs,
    ) -> Self {
        Self {
            java_bin: settings.java_bin.clone(),
            classpath: classpath(runsql_jar, &settings.driver_dir, artifact_name),
            main_class: settings.main_class.clone(),
            connection,
            timeout: settings.timeout,
        }
    }

    #[must_use]
    pub fn command_args(&self, invocation: &SqlInvocation) -> Vec<String> {
        let mut args = vec![
            "-cp".to_owned(),
            self.classpath.clone(),
            self.main_class.clone(),
        ];
        args.extend(self.connection.to_args());
        args.extend(invocation.to_args());
        args
    }
}

impl SqlExecutor for CliInvoker {
    fn execute(&self, invocation: &SqlInvocation) -> HarnessResult<ProcessOutput> {
        run_command_with_timeout(
            &self.java_bin,
            &self.command_args(invocation),
            None,
            self.timeout,
        )
    }
}

/// Produces the executor for one backend run.
pub trait ExecutorFactory {
    fn executor_for(
        &mut self,
        profile: &BackendProfile,
        connection: ConnectionArgs,
    ) -> HarnessResult<Box<dyn SqlExecutor>>;
}

/// Builds [`CliInvoker`]s, resolving the runsql jar once for the whole run.
#[derive(Debug)]
pub struct CliInvokerFactory {
    settings: CliSettings,
    artifacts: ArtifactResolver,
}

impl CliInvokerFactory {
    #[must_use]
    pub fn new(settings: CliSettings, artifacts: ArtifactResolver) -> Self {
        Self {
            settings,
            artifacts,
        }
    }
}

impl ExecutorFactory for CliInvokerFactory {
    fn executor_for(
        &mut self,
        profile: &BackendProfile,
        connection: ConnectionArgs,
    ) -> HarnessResult<Box<dyn SqlExecutor>> {
        let jar = self.artifacts.resolve()?;
        Ok(Box::new(CliInvoker::new(&self.settings, &jar, &profile.artifact_name, connection)))
    }
}
