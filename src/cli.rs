use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::artifact::{ArtifactSource, MavenProject};
use crate::error::HarnessResult;
use crate::fixtures::FixtureLayout;
use crate::invoker::CliSettings;
use crate::orchestrator::HarnessOptions;
use crate::profile::{BackendProfile, builtin_profiles, load_profiles, select_profiles};
use crate::readiness::ReadinessPolicy;

#[derive(Debug, Parser)]
#[command(name = "runsql-conformance")]
#[command(about = "Run the runsql functional tests against every supported database")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start each backend, run both suites against it, stop it.
    Run(RunArgs),
    /// List the configured backend profiles.
    Backends(BackendsArgs),
    /// Byte-compare an output file against a golden file.
    Compare(CompareArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct ProfileArgs {
    /// JSON file replacing the built-in backend profiles.
    #[arg(long)]
    pub profiles: Option<PathBuf>,
}

impl ProfileArgs {
    pub fn load(&self) -> HarnessResult<Vec<BackendProfile>> {
        match &self.profiles {
            Some(path) => load_profiles(path),
            None => Ok(builtin_profiles()),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Restrict the run to these backends (repeatable); default is all.
    #[arg(long = "backend")]
    pub backends: Vec<String>,

    /// Root of the SQL fixture and golden-file tree.
    #[arg(long, default_value = "functional_tests")]
    pub fixtures_dir: PathBuf,

    /// Directory holding the vendor JDBC driver jars.
    /// Defaults to `<fixtures-dir>/jdbc-drivers`.
    #[arg(long)]
    pub driver_dir: Option<PathBuf>,

    /// Prebuilt runsql jar to test.
    #[arg(long, conflicts_with = "pom")]
    pub artifact: Option<PathBuf>,

    /// runsql Maven project; defaults to `pom.xml` next to the fixtures dir.
    #[arg(long)]
    pub pom: Option<PathBuf>,

    /// Build runsql with `mvn clean package` before running.
    #[arg(long, conflicts_with = "artifact")]
    pub package: bool,

    /// Entry point class inside the runsql jar.
    #[arg(long, default_value = crate::invoker::DEFAULT_MAIN_CLASS)]
    pub main_class: String,

    /// Continue with the remaining backends after a failure.
    #[arg(long)]
    pub keep_going: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub profile_args: ProfileArgs,
}

impl RunArgs {
    pub fn selected_profiles(&self) -> HarnessResult<Vec<BackendProfile>> {
        select_profiles(self.profile_args.load()?, &self.backends)
    }

    #[must_use]
    pub fn layout(&self) -> FixtureLayout {
        FixtureLayout::new(&self.fixtures_dir)
    }

    #[must_use]
    pub fn default_pom(&self) -> PathBuf {
        self.fixtures_dir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("pom.xml")
    }

    pub fn maven_project<F>(&self, source: F) -> MavenProject
    where
        F: FnMut(&str) -> Option<String>,
    {
        let pom = self.pom.clone().unwrap_or_else(|| self.default_pom());
        MavenProject::from_source(pom, source)
    }

    pub fn artifact_source<F>(&self, source: F) -> ArtifactSource
    where
        F: FnMut(&str) -> Option<String>,
    {
        match &self.artifact {
            Some(jar) => ArtifactSource::Jar(jar.clone()),
            None => ArtifactSource::Maven(self.maven_project(source)),
        }
    }

    pub fn cli_settings<F>(&self, source: F) -> CliSettings
    where
        F: FnMut(&str) -> Option<String>,
    {
        let driver_dir = self
            .driver_dir
            .clone()
            .unwrap_or_else(|| self.layout().default_driver_dir());
        let mut settings = CliSettings::from_source(driver_dir, source);
        settings.main_class = self.main_class.clone();
        settings
    }

    pub fn options<F>(&self, source: F) -> HarnessOptions
    where
        F: FnMut(&str) -> Option<String>,
    {
        HarnessOptions {
            readiness: ReadinessPolicy::from_source(source),
            keep_going: self.keep_going,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct BackendsArgs {
    #[arg(long, value_enum, default_value_t = ListFormat::Plain)]
    pub format: ListFormat,

    #[command(flatten)]
    pub profile_args: ProfileArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CompareArgs {
    /// Golden file.
    pub expected: PathBuf,
    /// File produced by runsql.
    pub actual: PathBuf,
}

/// One line per profile for `backends --format plain`.
#[must_use]
pub fn describe_profile(profile: &BackendProfile) -> String {
    let target = match (&profile.container, profile.port) {
        (Some(spec), Some(port)) => format!("{} on port {port}", spec.image),
        _ => "embedded file".to_owned(),
    };
    let mut suites = Vec::new();
    if profile.generic_suite != crate::profile::GenericSuite::Skipped {
        suites.push("generic");
    }
    if profile.runs_specific_suite() {
        suites.push("specific");
    }
    format!("{} | {} | {}", profile.name, target, suites.join("+"))
}
