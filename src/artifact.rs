//! Resolution of the runsql jar that every CLI invocation puts on its
//! classpath.
//!
//! The path is resolved once and memoized by [`ArtifactResolver`];
//! [`ArtifactResolver::refresh`] forces a new resolution (for example after
//! the project was rebuilt with [`MavenProject::package`]).

use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};
use crate::process::run_command;

const DEFAULT_MAVEN_BIN: &str = "mvn";
pub const MAVEN_BIN_ENV: &str = "RUNSQL_HARNESS_MAVEN_BIN";

/// A Maven checkout of runsql.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenProject {
    pom: PathBuf,
    maven_bin: String,
}

impl MavenProject {
    #[must_use]
    pub fn new(pom: impl Into<PathBuf>, maven_bin: impl Into<String>) -> Self {
        Self {
            pom: pom.into(),
            maven_bin: maven_bin.into(),
        }
    }

    pub fn from_source<F>(pom: impl Into<PathBuf>, mut source: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let maven_bin = source(MAVEN_BIN_ENV)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MAVEN_BIN.to_owned());
        Self::new(pom, maven_bin)
    }

    #[must_use]
    pub fn pom(&self) -> &Path {
        &self.pom
    }

    fn base_dir(&self) -> &Path {
        self.pom.parent().unwrap_or_else(|| Path::new("."))
    }

    /// `clean package` the project quietly.
    pub fn package(&self) -> HarnessResult<()> {
        tracing::info!(pom = %self.pom.display(), "building runsql");
        let args = vec![
            "--file".to_owned(),
            self.pom.display().to_string(),
            "-q".to_owned(),
            "clean".to_owned(),
            "package".to_owned(),
        ];
        run_command(&self.maven_bin, &args, None)?;
        tracing::info!("done building runsql");
        Ok(())
    }

    /// Ask Maven for `${project.version}`.
    pub fn query_version(&self) -> HarnessResult<String> {
        let args = vec![
            "--file".to_owned(),
            self.pom.display().to_string(),
            "-q".to_owned(),
            "-Dexec.executable=echo".to_owned(),
            "-Dexec.args=${project.version}".to_owned(),
            "--non-recursive".to_owned(),
            "exec:exec".to_owned(),
        ];
        let output = run_command(&self.maven_bin, &args, None)?;
        let version = output.stdout_text().trim().to_owned();
        if version.is_empty() {
            return Err(HarnessError::ArtifactUnresolved(format!(
                "maven reported an empty project version for {}",
                self.pom.display()
            )));
        }
        Ok(version)
    }

    #[must_use]
    pub fn jar_for_version(&self, version: &str) -> PathBuf {
        self.base_dir()
            .join("target")
            .join(format!("runsql-{version}-jar-with-dependencies.jar"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// A prebuilt jar at a fixed path.
    Jar(PathBuf),
    /// The jar Maven builds for the project's current version.
    Maven(MavenProject),
}

#[derive(Debug)]
pub struct ArtifactResolver {
    source: ArtifactSource,
    cached: Option<PathBuf>,
    resolutions: u32,
}

impl ArtifactResolver {
    #[must_use]
    pub fn new(source: ArtifactSource) -> Self {
        Self {
            source,
            cached: None,
            resolutions: 0,
        }
    }

    /// Resolved path, computing it on first use.
    pub fn resolve(&mut self) -> HarnessResult<PathBuf> {
        if let Some(path) = &self.cached {
            return Ok(path.clone());
        }
        let path = self.resolve_uncached()?;
        self.cached = Some(path.clone());
        Ok(path)
    }

    /// Discard any cached path and resolve again.
    pub fn refresh(&mut self) -> HarnessResult<PathBuf> {
        self.invalidate();
        self.resolve()
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    fn resolve_uncached(&mut self) -> HarnessResult<PathBuf> {
        self.resolutions += 1;
        let path = match &self.source {
            ArtifactSource::Jar(path) => path.clone(),
            ArtifactSource::Maven(project) => {
                let version = project.query_version()?;
                project.jar_for_version(&version)
            }
        };
        if !path.is_file() {
            return Err(HarnessError::ArtifactUnresolved(format!("no jar at {}", path.display())));
        }
        tracing::debug!(
            artifact = %path.display(),
            resolutions = self.resolutions,
            "resolved runsql artifact"
        );
        Ok(path)
    }
}
