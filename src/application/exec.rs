//! Running commands through a `CommandRunner` with failures as errors

use tracing::info;

use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::CommandLine;
use crate::infrastructure::traits::CommandRunner;

/// Run a command; a spawn error or non-zero exit is an error.
pub fn check_call(runner: &dyn CommandRunner, cmd: &CommandLine) -> ApplicationResult<()> {
    info!("$ {cmd}");
    let status = runner.run(cmd).map_err(|source| ApplicationError::Spawn {
        command: cmd.to_string(),
        source,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(ApplicationError::CommandFailed {
            command: cmd.to_string(),
            code: status.code,
        })
    }
}
