//! Test environment orchestrator
//!
//! Runs named environments one at a time in list order. Each environment
//! gets its isolation directory, its dependencies installed, then its
//! commands. The first failing command stops the list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::exec::check_call;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{CommandLine, EnvPlan, EnvironmentSet};
use crate::infrastructure::traits::{CommandRunner, FileSystem};

/// Runs environments of an [`EnvironmentSet`].
pub struct OrchestratorService {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
}

impl OrchestratorService {
    pub fn new(fs: Arc<dyn FileSystem>, cmd: Arc<dyn CommandRunner>) -> Self {
        Self { fs, cmd }
    }

    /// Run `names` in order. Returns the names that passed.
    ///
    /// # Arguments
    /// * `root` - Project directory commands run in
    /// * `posargs` - Replaces `{posargs}` in environment commands
    /// * `path` - Inherited `PATH`, prefixed with `<envdir>/bin`
    #[instrument(skip(self, set, posargs, path))]
    pub fn run(
        &self,
        set: &EnvironmentSet,
        names: &[String],
        root: &Path,
        posargs: &[String],
        path: Option<&str>,
    ) -> ApplicationResult<Vec<String>> {
        set.validate()?;
        // resolve everything up front so a typo fails before anything runs
        let plans = names
            .iter()
            .map(|name| set.plan(name, root, posargs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut passed = Vec::with_capacity(plans.len());
        for plan in plans {
            info!("environment {}: {} command(s)", plan.name, plan.commands.len());
            self.run_one(&plan, path)
                .map_err(|e| ApplicationError::EnvironmentFailed {
                    env: plan.name.clone(),
                    source: Box::new(e),
                })?;
            passed.push(plan.name);
        }
        Ok(passed)
    }

    fn run_one(&self, plan: &EnvPlan, path: Option<&str>) -> ApplicationResult<()> {
        self.fs
            .create_dir_all(&plan.envdir)
            .with_path_context("create envdir", &plan.envdir)?;

        for cmd in plan.install.iter().chain(plan.commands.iter()) {
            let cmd = isolate(cmd.clone(), &plan.envdir, path);
            check_call(self.cmd.as_ref(), &cmd)?;
        }
        Ok(())
    }
}

/// Point a command at the environment's own binaries.
fn isolate(cmd: CommandLine, envdir: &Path, path: Option<&str>) -> CommandLine {
    let bin: PathBuf = envdir.join("bin");
    let path = match path {
        Some(p) if !p.is_empty() => format!("{}:{}", bin.display(), p),
        _ => bin.display().to_string(),
    };
    cmd.env("VIRTUAL_ENV", envdir.display().to_string())
        .env("PATH", path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_inherited_path_when_isolating_then_envdir_bin_first() {
        let cmd = isolate(CommandLine::new("flake8", Vec::<String>::new()), Path::new("/w/.quibble/lint"), Some("/usr/bin"));
        assert_eq!(cmd.env["PATH"], "/w/.quibble/lint/bin:/usr/bin");
        assert_eq!(cmd.env["VIRTUAL_ENV"], "/w/.quibble/lint");
    }
}
