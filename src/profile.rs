//! Backend profiles: one immutable record per database target.
//!
//! The six built-in profiles are declared statically by [`builtin_profiles`].
//! A JSON file with the same shape can replace them ([`load_profiles`]); every
//! profile is validated before any lifecycle or suite operation touches it.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Placeholder substituted with the ephemeral database file of file-based
/// backends.
pub const DB_FILE_PLACEHOLDER: &str = "{db_file}";

/// How a backend takes part in the backend-agnostic suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenericSuite {
    /// Compare against the golden files shared by every backend.
    Shared,
    /// Compare against golden files in the backend's own fixture directory.
    OwnGolden,
    /// The backend's dialect cannot run the shared fixtures.
    Skipped,
}

/// Image and run arguments of a server-style backend's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSpec {
    pub image: String,
    pub container_port: u16,
    /// `KEY=VALUE` pairs passed with `-e`.
    #[serde(default)]
    pub env: Vec<String>,
}

impl ContainerSpec {
    /// Backend-specific arguments appended after `run --name <n> --rm --detach`.
    #[must_use]
    pub fn run_args(&self, host_port: u16) -> Vec<String> {
        let mut args = vec![
            "--publish".to_owned(),
            format!("{host_port}:{}", self.container_port),
        ];
        for var in &self.env {
            args.push("-e".to_owned());
            args.push(var.clone());
        }
        args.push(self.image.clone());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendProfile {
    /// Short label; selects fixture file names (`<name>-expected-results.txt`).
    pub name: String,
    pub container_name: String,
    /// Host port the backend listens on; `None` for file-based backends.
    pub port: Option<u16>,
    pub connection_url: String,
    pub user: String,
    pub password: String,
    pub driver_identifier: String,
    /// Vendor driver jar placed on the runsql classpath.
    pub artifact_name: String,
    /// Fixture directory, relative to the fixtures root unless absolute.
    pub fixture_dir: PathBuf,
    /// SQL invoking the vendor-specific function under test. Backends without
    /// one skip the specific suite.
    pub stored_procedure_call: Option<String>,
    /// Trivial query used to detect that the server accepts connections.
    pub probe_sql: Option<String>,
    pub container: Option<ContainerSpec>,
    pub generic_suite: GenericSuite,
}

/// Connection parameters forwarded verbatim to runsql.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionArgs {
    pub url: String,
    pub user: String,
    pub password: String,
    pub driver: String,
}

impl ConnectionArgs {
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--url".to_owned(),
            self.url.clone(),
            "--user".to_owned(),
            self.user.clone(),
            "--password".to_owned(),
            self.password.clone(),
            "--driver".to_owned(),
            self.driver.clone(),
        ]
    }
}

impl BackendProfile {
    #[must_use]
    pub fn is_file_based(&self) -> bool {
        self.container.is_none()
    }

    #[must_use]
    pub fn runs_specific_suite(&self) -> bool {
        self.stored_procedure_call.is_some()
    }

    /// Build the connection parameters, substituting the ephemeral database
    /// file for file-based backends.
    #[must_use]
    pub fn connection(&self, db_file: Option<&Path>) -> ConnectionArgs {
        let url = match db_file {
            Some(path) => {
                let file = path.display().to_string();
                self.connection_url.replace(DB_FILE_PLACEHOLDER, &file)
            }
            None => self.connection_url.clone(),
        };
        ConnectionArgs {
            url,
            user: self.user.clone(),
            password: self.password.clone(),
            driver: self.driver_identifier.clone(),
        }
    }

    /// Arguments for `docker run` after the fixed `--name/--rm/--detach` prefix.
    /// `None` for file-based backends.
    #[must_use]
    pub fn container_run_args(&self) -> Option<Vec<String>> {
        let spec = self.container.as_ref()?;
        let port = self.port?;
        Some(spec.run_args(port))
    }

    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |reason: String| Err(HarnessError::InvalidProfile(reason));

        let slug = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if self.name.is_empty() || !self.name.chars().all(slug) {
            return invalid(format!("backend name `{}` must be a non-empty slug", self.name));
        }
        if self.connection_url.trim().is_empty() {
            return invalid(format!("backend `{}` has an empty connection_url", self.name));
        }
        if self.driver_identifier.trim().is_empty() || self.artifact_name.trim().is_empty() {
            return invalid(format!(
                "backend `{}` must name both a driver and a driver artifact",
                self.name
            ));
        }

        match &self.container {
            Some(spec) => {
                if self.container_name.trim().is_empty() {
                    return invalid(format!("backend `{}` has an empty container_name", self.name));
                }
                if spec.image.trim().is_empty() {
                    return invalid(format!("backend `{}` has an empty image", self.name));
                }
                if self.port.is_none() {
                    return invalid(format!("server backend `{}` requires a port", self.name));
                }
                let probe = self.probe_sql.as_deref().unwrap_or_default();
                if probe.trim().is_empty() {
                    return invalid(format!(
                        "server backend `{}` requires a readiness probe query",
                        self.name
                    ));
                }
                if let Some(bad) = spec.env.iter().find(|var| !var.contains('=')) {
                    return invalid(format!(
                        "backend `{}` env entry `{bad}` is not KEY=VALUE",
                        self.name
                    ));
                }
            }
            None => {
                if self.port.is_some() {
                    return invalid(format!(
                        "file-based backend `{}` must not declare a port",
                        self.name
                    ));
                }
                if !self.connection_url.contains(DB_FILE_PLACEHOLDER) {
                    return invalid(format!(
                        "file-based backend `{}` url must contain {DB_FILE_PLACEHOLDER}",
                        self.name
                    ));
                }
            }
        }

        if self
            .stored_procedure_call
            .as_deref()
            .is_some_and(|sql| sql.trim().is_empty())
        {
            return invalid(format!(
                "backend `{}` has an empty stored_procedure_call",
                self.name
            ));
        }
        if !self.runs_specific_suite() && self.generic_suite == GenericSuite::Skipped {
            return invalid(format!("backend `{}` would run no suite at all", self.name));
        }

        Ok(())
    }
}

/// Validate a whole profile set: each profile individually, names unique.
pub fn validate_profiles(profiles: &[BackendProfile]) -> HarnessResult<()> {
    let mut seen = HashSet::new();
    for profile in profiles {
        profile.validate()?;
        if !seen.insert(profile.name.as_str()) {
            return Err(HarnessError::InvalidProfile(format!(
                "duplicate backend name `{}`",
                profile.name
            )));
        }
    }
    Ok(())
}

/// Load and validate a JSON array of profiles.
pub fn load_profiles(path: &Path) -> HarnessResult<Vec<BackendProfile>> {
    let text = fs::read_to_string(path)?;
    let profiles: Vec<BackendProfile> = serde_json::from_str(&text)?;
    if profiles.is_empty() {
        return Err(HarnessError::InvalidProfile(format!(
            "no profiles declared in {}",
            path.display()
        )));
    }
    validate_profiles(&profiles)?;
    Ok(profiles)
}

/// Restrict `profiles` to `names`, keeping canonical order. An empty selection
/// keeps everything.
pub fn select_profiles(
    profiles: Vec<BackendProfile>,
    names: &[String],
) -> HarnessResult<Vec<BackendProfile>> {
    if names.is_empty() {
        return Ok(profiles);
    }
    if let Some(unknown) = names
        .iter()
        .find(|name| !profiles.iter().any(|p| &p.name == *name))
    {
        let known: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        return Err(HarnessError::InvalidRequest(format!(
            "unknown backend `{unknown}` (known: {})",
            known.join(", ")
        )));
    }
    Ok(profiles
        .into_iter()
        .filter(|p| names.contains(&p.name))
        .collect())
}

const MYSQL_PORT: u16 = 5100;
const MSSQL_PORT: u16 = 5101;
const ORACLE_PORT: u16 = 49161;
const POSTGRES_PORT: u16 = 5444;
const MSSQL_PASSWORD: &str = "4pnONNcrrrE&!qXay6YpZIOuiqzWO";

fn mysql_family(name: &str, image: &str) -> BackendProfile {
    BackendProfile {
        name: name.to_owned(),
        container_name: "runsql-mysql-maria".to_owned(),
        port: Some(MYSQL_PORT),
        connection_url: format!("jdbc:mysql://127.0.0.1:{MYSQL_PORT}/mysql?useSSL=false"),
        user: "root".to_owned(),
        password: String::new(),
        driver_identifier: "com.mysql.jdbc.Driver".to_owned(),
        artifact_name: "mysql-connector-java-5.1.40-bin.jar".to_owned(),
        fixture_dir: PathBuf::from("mysql"),
        stored_procedure_call: Some("call sp_test(30)".to_owned()),
        probe_sql: Some("select * from information_schema.columns;".to_owned()),
        container: Some(ContainerSpec {
            image: image.to_owned(),
            container_port: 3306,
            env: vec!["MYSQL_ALLOW_EMPTY_PASSWORD=yes".to_owned()],
        }),
        generic_suite: GenericSuite::Shared,
    }
}

/// The built-in backends in canonical run order.
#[must_use]
pub fn builtin_profiles() -> Vec<BackendProfile> {
    vec![
        mysql_family("maria", "mariadb:latest"),
        BackendProfile {
            name: "mssql".to_owned(),
            container_name: "runsql-mssql".to_owned(),
            port: Some(MSSQL_PORT),
            connection_url: format!("jdbc:sqlserver://127.0.0.1:{MSSQL_PORT}"),
            user: "sa".to_owned(),
            password: MSSQL_PASSWORD.to_owned(),
            driver_identifier: "com.microsoft.sqlserver.jdbc.SQLServerDriver".to_owned(),
            artifact_name: "sqljdbc42.jar".to_owned(),
            fixture_dir: PathBuf::from("mssql"),
            stored_procedure_call: Some("execute sp_test 30;".to_owned()),
            probe_sql: Some("select * from sys.tables;".to_owned()),
            container: Some(ContainerSpec {
                image: "microsoft/mssql-server-linux".to_owned(),
                container_port: 1433,
                env: vec![
                    "ACCEPT_EULA=Y".to_owned(),
                    format!("SA_PASSWORD={MSSQL_PASSWORD}"),
                ],
            }),
            generic_suite: GenericSuite::Shared,
        },
        mysql_family("mysql", "mysql:latest"),
        BackendProfile {
            name: "oracle".to_owned(),
            container_name: "runsql-oracle".to_owned(),
            port: Some(ORACLE_PORT),
            connection_url: format!("jdbc:oracle:thin:@127.0.0.1:{ORACLE_PORT}:xe"),
            user: "system".to_owned(),
            password: "oracle".to_owned(),
            driver_identifier: "oracle.jdbc.driver.OracleDriver".to_owned(),
            artifact_name: "ojdbc6.jar".to_owned(),
            fixture_dir: PathBuf::from("oracle"),
            stored_procedure_call: Some("select sp_test(30) from dual;".to_owned()),
            probe_sql: Some("select * from dual;".to_owned()),
            container: Some(ContainerSpec {
                image: "wnameless/oracle-xe-11g".to_owned(),
                container_port: 1521,
                env: vec!["ORACLE_ALLOW_REMOTE=true".to_owned()],
            }),
            // The shared fixtures use types Oracle XE does not accept.
            generic_suite: GenericSuite::Skipped,
        },
        BackendProfile {
            name: "postgres".to_owned(),
            container_name: "runsql-postgres".to_owned(),
            port: Some(POSTGRES_PORT),
            connection_url: format!("jdbc:postgresql://127.0.0.1:{POSTGRES_PORT}/postgres"),
            user: "postgres".to_owned(),
            password: String::new(),
            driver_identifier: "org.postgresql.Driver".to_owned(),
            artifact_name: "postgresql-42.2.2.jar".to_owned(),
            fixture_dir: PathBuf::from("postgres"),
            stored_procedure_call: Some("select sp_test(30)".to_owned()),
            probe_sql: Some("select 1;".to_owned()),
            container: Some(ContainerSpec {
                image: "postgres".to_owned(),
                container_port: 5432,
                env: vec!["POSTGRES_HOST_AUTH_METHOD=trust".to_owned()],
            }),
            generic_suite: GenericSuite::Shared,
        },
        BackendProfile {
            name: "sqlite".to_owned(),
            container_name: "runsql-sqlite".to_owned(),
            port: None,
            connection_url: format!(
                "jdbc:sqlite:{DB_FILE_PLACEHOLDER}?date_string_format=yyyy-MM-dd"
            ),
            user: String::new(),
            password: String::new(),
            driver_identifier: "org.sqlite.JDBC".to_owned(),
            artifact_name: "sqlite-jdbc-3.15.1.jar".to_owned(),
            fixture_dir: PathBuf::from("sqlite"),
            stored_procedure_call: None,
            probe_sql: None,
            container: None,
            generic_suite: GenericSuite::OwnGolden,
        },
    ]
}
