//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent business rule violations.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("unknown environment(s) in envlist '{list}': {names}")]
    UnknownEnvironment { list: String, names: String },

    #[error("environment '{0}' has no commands")]
    EmptyEnvironment(String),

    #[error("could not find a PHPUnit testsuite for {0}")]
    NoTestsuite(String),

    #[error("unrecognized zuul project: {0}")]
    UnrecognizedProject(String),

    #[error("composer.json has no require-dev section")]
    MissingRequireDev,
}
