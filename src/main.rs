use clap::Parser;
use runsql_conformance::artifact::ArtifactResolver;
use runsql_conformance::cli::{Cli, Command, ListFormat, RunArgs, describe_profile};
use runsql_conformance::container::DockerCli;
use runsql_conformance::invoker::CliInvokerFactory;
use runsql_conformance::oracle::assert_files_match;
use runsql_conformance::orchestrator::Harness;
use runsql_conformance::{HarnessError, HarnessResult};

fn main() {
    runsql_conformance::logging::init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> HarnessResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run_suites(&args),
        Command::Backends(args) => {
            let profiles = args.profile_args.load()?;
            match args.format {
                ListFormat::Plain => {
                    for profile in &profiles {
                        println!("{}", describe_profile(profile));
                    }
                }
                ListFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&profiles)?);
                }
            }
            Ok(())
        }
        Command::Compare(args) => {
            assert_files_match(&args.expected, &args.actual)?;
            println!("files match");
            Ok(())
        }
    }
}

fn run_suites(args: &RunArgs) -> HarnessResult<()> {
    let env = |key: &str| std::env::var(key).ok();
    let profiles = args.selected_profiles()?;

    if args.package {
        args.maven_project(env).package()?;
    }

    let executors = CliInvokerFactory::new(
        args.cli_settings(env),
        ArtifactResolver::new(args.artifact_source(env)),
    );
    let mut harness = Harness::new(
        DockerCli::from_env(),
        executors,
        args.layout(),
        args.options(env),
    );
    let report = harness.run_all(&profiles);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for backend in &report.backends {
            match &backend.error {
                None => println!("{}: passed ({} ms)", backend.name, backend.elapsed_ms),
                Some(error) => println!("{}: FAILED: {error}", backend.name),
            }
        }
        for name in &report.skipped {
            println!("{name}: skipped");
        }
    }

    if report.passed() {
        Ok(())
    } else {
        Err(HarnessError::RunFailed(
            report
                .failed_backends()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        ))
    }
}
