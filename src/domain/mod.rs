//! Domain layer: entities and business rules
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod command;
pub mod entities;
pub mod environment;
pub mod error;
pub mod mediawiki;
pub mod provision;

pub use command::CommandLine;
pub use entities::*;
pub use environment::{EnvLists, EnvPlan, EnvironmentSet, RunContext, TestEnvironment};
pub use error::DomainError;
pub use mediawiki::DbConnection;
pub use provision::{CloneSpec, ProvisionPlan, ProvisionStep};
