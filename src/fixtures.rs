//! Where SQL fixtures and golden files live.
//!
//! ```text
//! <root>/generic/generic-tables-and-data.sql
//! <root>/generic/batch-inserts.sql
//! <root>/generic/expected-results.txt
//! <root>/generic/expected-results-transaction.txt
//! <root>/<fixture_dir>/<name>-create-table-and-insert-data.sql
//! <root>/<fixture_dir>/<name>-expected-results.txt
//! <root>/<fixture_dir>/<name>-expected-results.csv
//! <root>/<fixture_dir>/<name>-stored-procedure.sql
//! <root>/<fixture_dir>/<name>-expected_results_db_function.txt
//! ```

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};
use crate::profile::{BackendProfile, GenericSuite};

const GENERIC_DIR: &str = "generic";
const GENERIC_DATA_SQL: &str = "generic-tables-and-data.sql";
const BATCH_INSERTS_SQL: &str = "batch-inserts.sql";
const GENERIC_EXPECTED: &str = "expected-results.txt";
const GENERIC_EXPECTED_TRANSACTION: &str = "expected-results-transaction.txt";
const DRIVER_DIR: &str = "jdbc-drivers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLayout {
    root: PathBuf,
}

/// Files of the backend-agnostic suite as seen by one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericFixtures {
    pub tables_and_data_sql: PathBuf,
    pub batch_inserts_sql: PathBuf,
    pub expected: PathBuf,
    pub expected_transaction: PathBuf,
}

/// Files of one backend's specific suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecificFixtures {
    pub create_table_sql: PathBuf,
    pub expected_txt: PathBuf,
    pub expected_csv: PathBuf,
    pub stored_procedure_sql: PathBuf,
    pub expected_function: PathBuf,
}

impl GenericFixtures {
    fn paths(&self) -> [&Path; 4] {
        [
            &self.tables_and_data_sql,
            &self.batch_inserts_sql,
            &self.expected,
            &self.expected_transaction,
        ]
    }
}

impl SpecificFixtures {
    fn paths(&self) -> [&Path; 5] {
        [
            &self.create_table_sql,
            &self.expected_txt,
            &self.expected_csv,
            &self.stored_procedure_sql,
            &self.expected_function,
        ]
    }
}

impl FixtureLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn default_driver_dir(&self) -> PathBuf {
        self.root.join(DRIVER_DIR)
    }

    #[must_use]
    pub fn backend_dir(&self, profile: &BackendProfile) -> PathBuf {
        if profile.fixture_dir.is_absolute() {
            profile.fixture_dir.clone()
        } else {
            self.root.join(&profile.fixture_dir)
        }
    }

    /// `None` when the backend skips the generic suite.
    #[must_use]
    pub fn generic(&self, profile: &BackendProfile) -> Option<GenericFixtures> {
        let shared = self.root.join(GENERIC_DIR);
        let golden_dir = match profile.generic_suite {
            GenericSuite::Skipped => return None,
            GenericSuite::Shared => shared.clone(),
            GenericSuite::OwnGolden => self.backend_dir(profile),
        };
        Some(GenericFixtures {
            tables_and_data_sql: shared.join(GENERIC_DATA_SQL),
            batch_inserts_sql: shared.join(BATCH_INSERTS_SQL),
            expected: golden_dir.join(GENERIC_EXPECTED),
            expected_transaction: golden_dir.join(GENERIC_EXPECTED_TRANSACTION),
        })
    }

    /// `None` when the backend has no stored function under test.
    #[must_use]
    pub fn specific(&self, profile: &BackendProfile) -> Option<SpecificFixtures> {
        if !profile.runs_specific_suite() {
            return None;
        }
        let dir = self.backend_dir(profile);
        let name = &profile.name;
        Some(SpecificFixtures {
            create_table_sql: dir.join(format!("{name}-create-table-and-insert-data.sql")),
            expected_txt: dir.join(format!("{name}-expected-results.txt")),
            expected_csv: dir.join(format!("{name}-expected-results.csv")),
            stored_procedure_sql: dir.join(format!("{name}-stored-procedure.sql")),
            expected_function: dir.join(format!("{name}-expected_results_db_function.txt")),
        })
    }

    /// Fails with the first fixture or golden file of `profile`'s suites that
    /// is not on disk. Runs before any container is started.
    pub fn preflight(&self, profile: &BackendProfile) -> HarnessResult<()> {
        let generic = self.generic(profile);
        let specific = self.specific(profile);
        let mut required: Vec<&Path> = Vec::new();
        if let Some(generic) = &generic {
            required.extend(generic.paths());
        }
        if let Some(specific) = &specific {
            required.extend(specific.paths());
        }
        match required.into_iter().find(|path| !path.is_file()) {
            Some(missing) => Err(HarnessError::MissingFixture(missing.to_path_buf())),
            None => Ok(()),
        }
    }
}
