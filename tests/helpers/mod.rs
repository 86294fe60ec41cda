#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use runsql_conformance::container::ContainerRuntime;
use runsql_conformance::error::{HarnessError, HarnessResult};
use runsql_conformance::fixtures::FixtureLayout;
use runsql_conformance::invoker::{
    ExecutorFactory, FileFormat, SqlExecutor, SqlInvocation, SqlSource, TransactionMode,
};
use runsql_conformance::orchestrator::HarnessOptions;
use runsql_conformance::process::ProcessOutput;
use runsql_conformance::profile::{BackendProfile, ConnectionArgs, builtin_profiles};
use runsql_conformance::readiness::ReadinessPolicy;
use runsql_conformance::suite::{GENERIC_SELECT, GENERIC_SELECT_ORDERED, SPECIFIC_SELECT};

// ---------------------------------------------------------------------------
// Fixture tree
// ---------------------------------------------------------------------------

pub const GENERIC_ROWS: [&str; 2] = ["b|2", "a|1"];
pub const BATCH_ROWS: [&str; 2] = ["d|4", "c|3"];
pub const SPECIFIC_ROWS: [&str; 2] = ["alice|30", "bob|40"];
pub const FUNCTION_RESULT: &str = "60\n";

/// The generic select after two committed batches and one rolled back.
pub fn expected_after_transactions() -> String {
    let mut rows: Vec<&str> = GENERIC_ROWS.to_vec();
    rows.extend(BATCH_ROWS);
    rows.extend(BATCH_ROWS);
    rows.sort_unstable();
    lines(&rows)
}

pub fn lines(rows: &[&str]) -> String {
    rows.iter().map(|row| format!("{row}\n")).collect()
}

pub fn csv_lines(rows: &[&str]) -> String {
    rows.iter()
        .map(|row| {
            let fields: Vec<String> = row.split('|').map(|f| format!("\"{f}\"")).collect();
            format!("{}\n", fields.join(","))
        })
        .collect()
}

/// A complete fixture tree for the built-in backends, in a temp directory.
/// SQL files hold one `|`-separated row per line; [`FakeDatabase`]
/// interprets them.
pub struct FixtureTree {
    dir: tempfile::TempDir,
}

impl FixtureTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("fixture tempdir");
        let root = dir.path();

        let generic = root.join("generic");
        fs::create_dir_all(&generic).expect("generic dir");
        write(
            &generic.join("generic-tables-and-data.sql"),
            &lines(&GENERIC_ROWS),
        );
        write(&generic.join("batch-inserts.sql"), &lines(&BATCH_ROWS));
        write(&generic.join("expected-results.txt"), &lines(&GENERIC_ROWS));
        write(
            &generic.join("expected-results-transaction.txt"),
            &expected_after_transactions(),
        );

        let layout = FixtureLayout::new(root);
        for profile in builtin_profiles() {
            fs::create_dir_all(layout.backend_dir(&profile)).expect("backend dir");
            if let Some(own) = layout.generic(&profile)
                && own.expected.parent() != Some(generic.as_path())
            {
                write(&own.expected, &lines(&GENERIC_ROWS));
                write(&own.expected_transaction, &expected_after_transactions());
            }
            if let Some(specific) = layout.specific(&profile) {
                write(&specific.create_table_sql, &lines(&SPECIFIC_ROWS));
                write(&specific.expected_txt, &lines(&SPECIFIC_ROWS));
                write(&specific.expected_csv, &csv_lines(&SPECIFIC_ROWS));
                write(&specific.stored_procedure_sql, "sp_test\n");
                write(&specific.expected_function, FUNCTION_RESULT);
            }
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn layout(&self) -> FixtureLayout {
        FixtureLayout::new(self.root())
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }
}

fn write(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

pub fn profile(name: &str) -> BackendProfile {
    builtin_profiles()
        .into_iter()
        .find(|p| p.name == name)
        .unwrap_or_else(|| panic!("no builtin profile `{name}`"))
}

pub fn fast_options(keep_going: bool) -> HarnessOptions {
    HarnessOptions {
        readiness: ReadinessPolicy {
            max_attempts: 4,
            interval: Duration::ZERO,
        },
        keep_going,
    }
}

// ---------------------------------------------------------------------------
// Fake runsql: an in-memory database that honours runsql's flags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flaw {
    None,
    /// Rollback-mode batches are committed anyway.
    IgnoresRollback,
    /// CSV output is written in the default format.
    IgnoresCsv,
    /// Every invocation exits non-zero.
    Broken,
}

#[derive(Debug, Default)]
pub struct DatabaseState {
    pub generic_rows: Vec<String>,
    pub specific_rows: Vec<String>,
    pub procedure_defined: bool,
    pub invocations: Vec<SqlInvocation>,
    pub probes: u32,
}

pub struct FakeDatabase {
    pub state: Rc<RefCell<DatabaseState>>,
    flaw: Flaw,
    unready_probes: u32,
    probe_sql: Option<String>,
    procedure_call: Option<String>,
}

impl FakeDatabase {
    pub fn new(profile: &BackendProfile, flaw: Flaw, unready_probes: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(DatabaseState::default())),
            flaw,
            unready_probes,
            probe_sql: profile.probe_sql.clone(),
            procedure_call: profile.stored_procedure_call.clone(),
        }
    }

    fn fail(message: &str) -> HarnessError {
        HarnessError::from_command_failure(
            "java -cp fake runsql.RunSqlMain".to_owned(),
            1,
            message.to_owned(),
        )
    }

    fn run_file(&self, path: &Path, invocation: &SqlInvocation) -> HarnessResult<()> {
        let body = fs::read_to_string(path)?;
        let rows: Vec<String> = body
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut state = self.state.borrow_mut();
        if name == "generic-tables-and-data.sql" {
            state.generic_rows = rows;
        } else if name == "batch-inserts.sql" {
            let rolled_back = invocation.transaction_mode == Some(TransactionMode::Rollback)
                && self.flaw != Flaw::IgnoresRollback;
            if !rolled_back {
                state.generic_rows.extend(rows);
            }
        } else if name.ends_with("-create-table-and-insert-data.sql") {
            state.specific_rows = rows;
        } else if name.ends_with("-stored-procedure.sql") {
            if invocation.split_statements != Some(false) {
                return Err(Self::fail("procedure body split into statements"));
            }
            state.procedure_defined = true;
        } else {
            return Err(Self::fail(&format!("unknown script {name}")));
        }
        Ok(())
    }

    fn run_sql(&self, sql: &str, invocation: &SqlInvocation) -> HarnessResult<String> {
        let mut state = self.state.borrow_mut();
        if self.probe_sql.as_deref() == Some(sql) {
            state.probes += 1;
            if state.probes <= self.unready_probes {
                return Err(Self::fail("Connection refused"));
            }
            return Ok(String::new());
        }
        if self.procedure_call.as_deref() == Some(sql) {
            if !state.procedure_defined {
                return Err(Self::fail("function sp_test does not exist"));
            }
            return Ok(FUNCTION_RESULT.to_owned());
        }

        let rows: Vec<&str> = match sql {
            GENERIC_SELECT => state.generic_rows.iter().map(String::as_str).collect(),
            GENERIC_SELECT_ORDERED => {
                let mut rows: Vec<&str> = state.generic_rows.iter().map(String::as_str).collect();
                rows.sort_unstable();
                rows
            }
            SPECIFIC_SELECT => state.specific_rows.iter().map(String::as_str).collect(),
            other => return Err(Self::fail(&format!("syntax error near `{other}`"))),
        };
        let csv = invocation.file_format == Some(FileFormat::Csv) && self.flaw != Flaw::IgnoresCsv;
        Ok(if csv { csv_lines(&rows) } else { lines(&rows) })
    }
}

impl SqlExecutor for FakeDatabase {
    fn execute(&self, invocation: &SqlInvocation) -> HarnessResult<ProcessOutput> {
        self.state.borrow_mut().invocations.push(invocation.clone());
        if self.flaw == Flaw::Broken {
            return Err(Self::fail("Communications link failure"));
        }
        let result = match &invocation.source {
            SqlSource::File(path) => self.run_file(path, invocation).map(|()| String::new()),
            SqlSource::Text(sql) => self.run_sql(sql, invocation),
        }?;
        if let Some(path) = &invocation.output {
            fs::write(path, &result)?;
        }
        Ok(ProcessOutput::success(""))
    }
}

/// Hands out one fresh [`FakeDatabase`] per backend run and keeps a handle on
/// each for later inspection.
#[derive(Default)]
pub struct FakeFactory {
    pub flaws: Vec<(String, Flaw)>,
    pub unready_probes: u32,
    pub created: Vec<(String, ConnectionArgs, Rc<RefCell<DatabaseState>>)>,
}

impl FakeFactory {
    pub fn with_flaw(backend: &str, flaw: Flaw) -> Self {
        Self {
            flaws: vec![(backend.to_owned(), flaw)],
            ..Self::default()
        }
    }

    pub fn state(&self, backend: &str) -> Rc<RefCell<DatabaseState>> {
        self.created
            .iter()
            .find(|(name, _, _)| name == backend)
            .map(|(_, _, state)| Rc::clone(state))
            .unwrap_or_else(|| panic!("no executor created for `{backend}`"))
    }

    pub fn connection(&self, backend: &str) -> &ConnectionArgs {
        self.created
            .iter()
            .find(|(name, _, _)| name == backend)
            .map(|(_, connection, _)| connection)
            .unwrap_or_else(|| panic!("no executor created for `{backend}`"))
    }
}

impl ExecutorFactory for FakeFactory {
    fn executor_for(
        &mut self,
        profile: &BackendProfile,
        connection: ConnectionArgs,
    ) -> HarnessResult<Box<dyn SqlExecutor>> {
        let flaw = self
            .flaws
            .iter()
            .find(|(name, _)| *name == profile.name)
            .map_or(Flaw::None, |(_, flaw)| *flaw);
        let database = FakeDatabase::new(profile, flaw, self.unready_probes);
        self.created
            .push((profile.name.clone(), connection, Rc::clone(&database.state)));
        Ok(Box::new(database))
    }
}

// ---------------------------------------------------------------------------
// Fake container runtime
// ---------------------------------------------------------------------------

/// Records `run`/`kill` calls as `"run <name>"` / `"kill <name>"`.
#[derive(Default)]
pub struct RecordingRuntime {
    pub events: RefCell<Vec<String>>,
    pub run_args: RefCell<Vec<Vec<String>>>,
    pub refuse_start: Option<String>,
}

impl RecordingRuntime {
    pub fn refusing(name: &str) -> Self {
        Self {
            refuse_start: Some(name.to_owned()),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn running(&self) -> Vec<String> {
        let mut running: Vec<String> = Vec::new();
        for event in self.events.borrow().iter() {
            if let Some(name) = event.strip_prefix("run ") {
                running.push(name.to_owned());
            } else if let Some(name) = event.strip_prefix("kill ") {
                running.retain(|n| n != name);
            }
        }
        running
    }
}

impl ContainerRuntime for RecordingRuntime {
    fn run_detached(&self, name: &str, args: &[String]) -> HarnessResult<ProcessOutput> {
        if self.refuse_start.as_deref() == Some(name) {
            return Err(HarnessError::from_command_failure(
                format!("docker run --name {name}"),
                125,
                "Conflict. The container name is already in use".to_owned(),
            ));
        }
        self.events.borrow_mut().push(format!("run {name}"));
        self.run_args.borrow_mut().push(args.to_vec());
        Ok(ProcessOutput::success("0123456789ab\n"))
    }

    fn kill(&self, name: &str) -> HarnessResult<ProcessOutput> {
        self.events.borrow_mut().push(format!("kill {name}"));
        Ok(ProcessOutput::success(format!("{name}\n")))
    }
}

// ---------------------------------------------------------------------------
// Stub executables for end-to-end runs of the binary
// ---------------------------------------------------------------------------

/// Write an executable shell script that appends its arguments to `log`.
/// When `--outputfilepath` is given, `output_body` is written there.
#[cfg(unix)]
pub fn write_logging_stub(dir: &Path, name: &str, log: &Path, output_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
        "#!/bin/sh\n\
         echo \"$@\" >> '{log}'\n\
         out=\"\"\n\
         while [ $# -gt 0 ]; do\n\
         \x20 if [ \"$1\" = \"--outputfilepath\" ]; then out=\"$2\"; shift; fi\n\
         \x20 shift\n\
         done\n\
         if [ -n \"$out\" ]; then printf '{output_body}' > \"$out\"; fi\n\
         echo stub-ok\n",
        log = log.display(),
    );
    let path = dir.join(name);
    fs::write(&path, script).expect("write stub");
    let mut perms = fs::metadata(&path).expect("stub metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod stub");
    path
}
