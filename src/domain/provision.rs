//! Image provisioning plan: packages, bare repository caches, services

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::CommandLine;

/// One bare clone into a fixed path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloneSpec {
    pub url: String,
    pub dest: PathBuf,
}

impl CloneSpec {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
        }
    }
}

/// Declarative provisioning of a CI image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionPlan {
    pub packages: Vec<String>,
    pub clones: Vec<CloneSpec>,
    pub services: Vec<String>,
}

impl Default for ProvisionPlan {
    fn default() -> Self {
        Self {
            packages: [
                "python3",
                "python3-pip",
                "git",
                "mysql-server",
                "php-cli",
                "php-mysql",
                "php-sqlite3",
                "php-xml",
                "php-mbstring",
                "composer",
                "npm",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            clones: vec![
                CloneSpec::new(
                    "https://gerrit.wikimedia.org/r/mediawiki/core",
                    "/srv/git/mediawiki/core.git",
                ),
                CloneSpec::new(
                    "https://gerrit.wikimedia.org/r/mediawiki/vendor",
                    "/srv/git/mediawiki/vendor.git",
                ),
                CloneSpec::new(
                    "https://gerrit.wikimedia.org/r/integration/composer",
                    "/srv/deployment/integration/composer",
                ),
            ],
            services: vec!["mysql".to_string()],
        }
    }
}

/// A single provisioning action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionStep {
    InstallPackages(Vec<String>),
    Clone(CloneSpec),
    StartService(String),
}

impl ProvisionStep {
    pub fn command(&self) -> CommandLine {
        match self {
            ProvisionStep::InstallPackages(packages) => {
                CommandLine::new("apt-get", ["install", "-y", "--no-install-recommends"])
                    .env("DEBIAN_FRONTEND", "noninteractive")
                    .extend_args(packages)
            }
            ProvisionStep::Clone(clone) => CommandLine::new(
                "git",
                [
                    "clone".to_string(),
                    "--bare".to_string(),
                    clone.url.clone(),
                    clone.dest.to_string_lossy().into_owned(),
                ],
            ),
            ProvisionStep::StartService(name) => {
                CommandLine::new("service", [name.as_str(), "start"])
            }
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::InstallPackages(p) => write!(f, "install {} package(s)", p.len()),
            ProvisionStep::Clone(clone) => write!(f, "clone {} -> {}", clone.url, clone.dest.display()),
            ProvisionStep::StartService(name) => write!(f, "start service {name}"),
        }
    }
}

impl ProvisionPlan {
    /// Steps in execution order: packages, clones, services.
    pub fn steps(&self) -> Vec<ProvisionStep> {
        let mut steps = Vec::with_capacity(1 + self.clones.len() + self.services.len());
        if !self.packages.is_empty() {
            steps.push(ProvisionStep::InstallPackages(self.packages.clone()));
        }
        steps.extend(self.clones.iter().cloned().map(ProvisionStep::Clone));
        steps.extend(self.services.iter().cloned().map(ProvisionStep::StartService));
        steps
    }
}
