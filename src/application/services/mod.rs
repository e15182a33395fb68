//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem, CommandRunner, ...)
//! but are themselves concrete structs, not traits.

mod backends;
mod mediawiki;
mod orchestrator;
mod provision;

pub use backends::{Backends, Database, DB_NAME, DB_PASSWORD, DB_USER};
pub use mediawiki::{clone_map, MediaWikiService, RunOptions};
pub use orchestrator::OrchestratorService;
pub use provision::ProvisionService;
