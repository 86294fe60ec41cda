#![forbid(unsafe_code)]

pub mod artifact;
pub mod cli;
pub mod container;
pub mod error;
pub mod fixtures;
pub mod invoker;
pub mod logging;
pub mod oracle;
pub mod orchestrator;
pub mod process;
pub mod profile;
pub mod readiness;
pub mod suite;

pub use error::{HarnessError, HarnessResult};
pub use invoker::{SqlExecutor, SqlInvocation};
pub use orchestrator::{Harness, HarnessOptions, RunReport};
pub use profile::{BackendProfile, builtin_profiles};
