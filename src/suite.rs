//! The two test suites every backend runs through.
//!
//! Both are strictly ordered: later steps read rows or procedures created by
//! earlier ones. Any CLI failure or golden-file mismatch ends the suite; the
//! steps completed so far stay recorded in the caller's [`SuiteReport`].

use std::num::NonZeroU32;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::HarnessResult;
use crate::fixtures::{GenericFixtures, SpecificFixtures};
use crate::invoker::{FileFormat, SqlExecutor, SqlInvocation, TransactionMode};
use crate::oracle::{ComparisonOutcome, assert_files_match};

pub const GENERIC_SELECT: &str = "select * from generic_person;";
pub const GENERIC_SELECT_ORDERED: &str = "select * from generic_person order by a_char, a_varchar;";
pub const SPECIFIC_SELECT: &str = "select * from person;";

const BATCH_SIZE: NonZeroU32 = NonZeroU32::new(3).expect("non-zero");
const COMMIT_INTERVAL: NonZeroU32 = NonZeroU32::new(3).expect("non-zero");
const ROLLBACK_BATCH_SIZE: NonZeroU32 = NonZeroU32::new(10).expect("non-zero");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Generic,
    Specific,
}

impl SuiteKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Specific => "specific",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub invocation: SqlInvocation,
    pub comparison: Option<ComparisonOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub suite: SuiteKind,
    pub completed: bool,
    pub steps: Vec<StepRecord>,
}

impl SuiteReport {
    #[must_use]
    pub fn new(suite: SuiteKind) -> Self {
        Self {
            suite,
            completed: false,
            steps: Vec::new(),
        }
    }
}

/// What a suite needs to know about the backend it runs against.
pub struct SuiteContext<'a> {
    pub backend: &'a str,
    pub executor: &'a dyn SqlExecutor,
    /// Directory for output files; removed by the caller after the run.
    pub scratch_dir: &'a Path,
}

impl SuiteContext<'_> {
    fn execute(
        &self,
        report: &mut SuiteReport,
        step: &str,
        invocation: SqlInvocation,
    ) -> HarnessResult<()> {
        tracing::info!(
            backend = %self.backend,
            suite = report.suite.as_str(),
            step,
            "running step"
        );
        self.executor.execute(&invocation)?;
        report.steps.push(StepRecord {
            step: step.to_owned(),
            invocation,
            comparison: None,
        });
        Ok(())
    }

    /// Run `invocation` with a fresh output file and compare that file to
    /// `expected`.
    fn execute_and_compare(
        &self,
        report: &mut SuiteReport,
        step: &str,
        output_prefix: &str,
        invocation: SqlInvocation,
        expected: &Path,
    ) -> HarnessResult<()> {
        let output = self.output_file(output_prefix)?;
        let output_path = output.path().to_path_buf();
        let invocation = invocation.output(&output_path);
        tracing::info!(
            backend = %self.backend,
            suite = report.suite.as_str(),
            step,
            output = %output_path.display(),
            "running step"
        );
        self.executor.execute(&invocation)?;
        let comparison = assert_files_match(expected, &output_path)?;
        report.steps.push(StepRecord {
            step: step.to_owned(),
            invocation,
            comparison: Some(comparison),
        });
        Ok(())
    }

    fn output_file(&self, prefix: &str) -> HarnessResult<NamedTempFile> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(self.scratch_dir)?;
        Ok(file)
    }
}

/// Backend-agnostic workload: baseline rows, a select, three batch runs in
/// different transaction modes (the last rolled back), and an ordered select
/// reflecting only the committed batches.
pub fn run_generic_suite(
    ctx: &SuiteContext<'_>,
    fixtures: &GenericFixtures,
    report: &mut SuiteReport,
) -> HarnessResult<()> {
    ctx.execute(
        report,
        "create-generic-table",
        SqlInvocation::file(&fixtures.tables_and_data_sql),
    )?;
    ctx.execute_and_compare(
        report,
        "select-generic",
        "generic-test-output",
        SqlInvocation::sql(GENERIC_SELECT),
        &fixtures.expected,
    )?;

    let batch = SqlInvocation::file(&fixtures.batch_inserts_sql);
    ctx.execute(report, "batch-insert", batch.clone().batch_size(BATCH_SIZE))?;
    ctx.execute(
        report,
        "transaction-insert",
        batch
            .clone()
            .transaction_mode(TransactionMode::CommitEvery(COMMIT_INTERVAL)),
    )?;
    ctx.execute(
        report,
        "rollback-insert",
        batch
            .transaction_mode(TransactionMode::Rollback)
            .batch_size(ROLLBACK_BATCH_SIZE),
    )?;

    ctx.execute_and_compare(
        report,
        "select-after-transactions",
        "generic-test-output-batch",
        SqlInvocation::sql(GENERIC_SELECT_ORDERED),
        &fixtures.expected_transaction,
    )?;

    report.completed = true;
    tracing::info!(backend = %ctx.backend, "generic suite passed");
    Ok(())
}

/// Backend-specific workload: the backend's own table, default and CSV output
/// of the same select, and its stored function called with `30`.
pub fn run_specific_suite(
    ctx: &SuiteContext<'_>,
    fixtures: &SpecificFixtures,
    stored_procedure_call: &str,
    report: &mut SuiteReport,
) -> HarnessResult<()> {
    let name = ctx.backend;
    ctx.execute(
        report,
        "create-table",
        SqlInvocation::file(&fixtures.create_table_sql),
    )?;
    ctx.execute_and_compare(
        report,
        "select-default-format",
        &format!("{name}-"),
        SqlInvocation::sql(SPECIFIC_SELECT),
        &fixtures.expected_txt,
    )?;
    ctx.execute_and_compare(
        report,
        "select-csv-format",
        &format!("{name}-csv-"),
        SqlInvocation::sql(SPECIFIC_SELECT).file_format(FileFormat::Csv),
        &fixtures.expected_csv,
    )?;

    // Procedure bodies contain statement terminators; send the file whole.
    ctx.execute(
        report,
        "define-stored-procedure",
        SqlInvocation::file(&fixtures.stored_procedure_sql).split_statements(false),
    )?;
    ctx.execute_and_compare(
        report,
        "call-stored-procedure",
        &format!("{name}-sp"),
        SqlInvocation::sql(stored_procedure_call),
        &fixtures.expected_function,
    )?;

    report.completed = true;
    tracing::info!(backend = %name, "specific suite passed");
    Ok(())
}
