//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::application::services::{
    Backends, MediaWikiService, OrchestratorService, ProvisionService,
};
use crate::config::Settings;
use crate::infrastructure::traits::{
    CommandRunner, FileSystem, NetworkProbe, RealCommandRunner, RealFileSystem, TcpProbe,
};

/// How long background services get to become ready.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// UTF-8 subset of `vars`; other entries are skipped.
pub fn env_snapshot(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(k, v)| match (k.into_string(), v.into_string()) {
            (Ok(k), Ok(v)) => Some((k, v)),
            (k, _) => {
                let key = k.unwrap_or_else(|k| k.to_string_lossy().into_owned());
                debug!("skipping non UTF-8 environment variable {key}");
                None
            }
        })
        .collect()
}

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Command runner abstraction
    pub cmd: Arc<dyn CommandRunner>,

    /// Network readiness probe
    pub probe: Arc<dyn NetworkProbe>,

    /// Snapshot of the process environment
    pub env: BTreeMap<String, String>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(
            settings,
            Arc::new(RealFileSystem),
            Arc::new(RealCommandRunner),
            Arc::new(TcpProbe),
            env_snapshot(std::env::vars_os()),
        )
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        probe: Arc<dyn NetworkProbe>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
            cmd,
            probe,
            env,
        }
    }

    pub fn provision_service(&self) -> ProvisionService {
        ProvisionService::new(self.fs.clone(), self.cmd.clone())
    }

    pub fn orchestrator_service(&self) -> OrchestratorService {
        OrchestratorService::new(self.fs.clone(), self.cmd.clone())
    }

    pub fn mediawiki_service(&self) -> MediaWikiService {
        let backends = Backends::new(
            self.fs.clone(),
            self.cmd.clone(),
            self.probe.clone(),
            STARTUP_TIMEOUT,
        );
        MediaWikiService::new(self.fs.clone(), self.cmd.clone(), backends, self.env.clone())
    }
}
