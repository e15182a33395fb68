//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::DomainError;
use crate::exitcode;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<DomainError> for CliError {
    fn from(e: DomainError) -> Self {
        ApplicationError::Domain(e).into()
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    ///
    /// A failed child command passes its own exit code through.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::Infra(InfraError::Io { .. }) => exitcode::IOERR,
            CliError::Infra(InfraError::Application(e)) => {
                if let Some(code) = e.command_exit_code() {
                    return code;
                }
                match e {
                    ApplicationError::Domain(DomainError::UnknownStage(_)) => exitcode::USAGE,
                    ApplicationError::Domain(_) | ApplicationError::Config { .. } => {
                        exitcode::CONFIG
                    }
                    ApplicationError::Spawn { .. } => exitcode::UNAVAILABLE,
                    ApplicationError::ServiceNotReady { .. } => exitcode::UNAVAILABLE,
                    _ => exitcode::SOFTWARE,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_failed_command_when_exit_code_then_propagates_child_code() {
        let err: CliError = ApplicationError::EnvironmentFailed {
            env: "unit".to_string(),
            source: Box::new(ApplicationError::CommandFailed {
                command: "nosetests".to_string(),
                code: Some(3),
            }),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn given_killed_command_when_exit_code_then_software() {
        let err: CliError = ApplicationError::CommandFailed {
            command: "php".to_string(),
            code: None,
        }
        .into();
        assert_eq!(err.exit_code(), exitcode::SOFTWARE);
    }

    #[test]
    fn given_unknown_environment_when_exit_code_then_config() {
        let err: CliError = DomainError::UnknownEnvironment {
            list: "ci".to_string(),
            names: "nope".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exitcode::CONFIG);
    }
}
