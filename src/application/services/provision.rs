//! Image provisioning service
//!
//! Installs packages, seeds bare repository caches and starts services.
//! Steps run strictly in order; the first failure aborts the provisioning.

use std::sync::Arc;

use tracing::{debug, info};

use crate::application::exec::check_call;
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{ProvisionPlan, ProvisionStep};
use crate::infrastructure::traits::{CommandRunner, FileSystem};

/// Runs a [`ProvisionPlan`].
pub struct ProvisionService {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
}

impl ProvisionService {
    pub fn new(fs: Arc<dyn FileSystem>, cmd: Arc<dyn CommandRunner>) -> Self {
        Self { fs, cmd }
    }

    /// Execute every step of `plan`, returning the steps completed.
    pub fn run(&self, plan: &ProvisionPlan) -> ApplicationResult<Vec<ProvisionStep>> {
        let steps = plan.steps();
        info!("provisioning: {} step(s)", steps.len());

        for (i, step) in steps.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, steps.len(), step);
            self.run_step(step)
                .map_err(|e| ApplicationError::ProvisionFailed {
                    step: step.to_string(),
                    source: Box::new(e),
                })?;
        }
        Ok(steps)
    }

    fn run_step(&self, step: &ProvisionStep) -> ApplicationResult<()> {
        if let ProvisionStep::Clone(clone) = step {
            if let Some(parent) = clone.dest.parent() {
                self.fs
                    .create_dir_all(parent)
                    .with_path_context("create clone parent", parent)?;
            }
        }

        check_call(self.cmd.as_ref(), &step.command())?;

        if let ProvisionStep::Clone(clone) = step {
            if !self.fs.is_non_empty_dir(&clone.dest) {
                return Err(ApplicationError::EmptyClone(clone.dest.clone()));
            }
            debug!("clone ok: {}", clone.dest.display());
        }
        Ok(())
    }
}
