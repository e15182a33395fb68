//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("command failed with {}: {command}", describe_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("cannot run {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provisioning step '{step}' failed")]
    ProvisionFailed {
        step: String,
        #[source]
        source: Box<ApplicationError>,
    },

    #[error("clone destination is missing or empty: {0}")]
    EmptyClone(PathBuf),

    #[error("{name} did not become ready within {seconds}s")]
    ServiceNotReady { name: String, seconds: u64 },

    #[error("environment '{env}' failed")]
    EnvironmentFailed {
        env: String,
        #[source]
        source: Box<ApplicationError>,
    },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "signal".to_string(),
    }
}

impl ApplicationError {
    /// Exit code of the failed child command this error originates from, if any.
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            ApplicationError::CommandFailed { code, .. } => *code,
            ApplicationError::ProvisionFailed { source, .. }
            | ApplicationError::EnvironmentFailed { source, .. } => source.command_exit_code(),
            _ => None,
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
