//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/quibble/quibble.toml`
//! 3. Local config: `<project_dir>/.quibble.toml`
//! 4. Environment variables: `QUIBBLE_*` prefix

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, Map};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::{
    expand_env_vars, CloneSpec, EnvLists, EnvironmentSet, ProvisionPlan, TestEnvironment,
};

/// Marker file present inside Docker containers.
const DOCKERENV: &str = "/.dockerenv";

pub fn is_in_docker() -> bool {
    Path::new(DOCKERENV).exists()
}

/// Raw provisioning config (arrays are Option to detect "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawProvisionConfig {
    pub packages: Option<Vec<String>>,
    pub clones: Option<Vec<CloneSpec>>,
    pub services: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawEnvLists {
    pub default: Option<Vec<String>>,
    pub ci: Option<Vec<String>>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub git_cache: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub gerrit_url: Option<String>,
    pub http_port: Option<u16>,
    pub display: Option<String>,
    pub provision: RawProvisionConfig,
    pub environments: BTreeMap<String, TestEnvironment>,
    pub envlist: RawEnvLists,
}

/// Unified configuration for quibble.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Bare repositories speeding up clones (default: /srv/git in Docker, else ref)
    pub git_cache: Option<PathBuf>,
    /// Logs and artifacts (default: /log in Docker, else log)
    pub log_dir: Option<PathBuf>,
    /// Base URL zuul-cloner fetches projects from
    pub gerrit_url: String,
    /// Port of the PHP built-in web server
    pub http_port: u16,
    /// X display started when DISPLAY is unset
    pub display: String,
    pub provision: ProvisionPlan,
    pub environments: BTreeMap<String, TestEnvironment>,
    pub envlist: EnvLists,
}

impl Default for Settings {
    fn default() -> Self {
        let tests = EnvironmentSet::default();
        Self {
            git_cache: None,
            log_dir: None,
            gerrit_url: "https://gerrit.wikimedia.org/r/p".to_string(),
            http_port: 9412,
            display: ":94".to_string(),
            provision: ProvisionPlan::default(),
            environments: tests.environments,
            envlist: tests.envlist,
        }
    }
}

/// Get the XDG config directory for quibble.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quibble").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("quibble.toml"))
}

/// Get the path to the local config file of a project.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".quibble.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Environments and env lists as one set.
    pub fn environment_set(&self) -> EnvironmentSet {
        EnvironmentSet {
            environments: self.environments.clone(),
            envlist: self.envlist.clone(),
        }
    }

    /// Git cache, falling back to the Docker-dependent default.
    pub fn git_cache_or_default(&self, in_docker: bool) -> PathBuf {
        self.git_cache.clone().unwrap_or_else(|| {
            PathBuf::from(if in_docker { "/srv/git" } else { "ref" })
        })
    }

    /// Log dir, falling back to the Docker-dependent default.
    pub fn log_dir_or_default(&self, in_docker: bool) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(if in_docker { "/log" } else { "log" }))
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        let expand = |p: &Path| PathBuf::from(expand_env_vars(p.to_string_lossy().as_ref()));
        self.git_cache = self.git_cache.as_deref().map(expand);
        self.log_dir = self.log_dir.as_deref().map(expand);
        for clone in &mut self.provision.clones {
            clone.dest = expand(&clone.dest);
        }
    }

    /// Overlay a config file: scalars and arrays replace, environments merge by name.
    fn merge_with(&self, overlay: RawSettings) -> Self {
        let mut environments = self.environments.clone();
        environments.extend(overlay.environments);
        Self {
            git_cache: overlay.git_cache.or_else(|| self.git_cache.clone()),
            log_dir: overlay.log_dir.or_else(|| self.log_dir.clone()),
            gerrit_url: overlay
                .gerrit_url
                .unwrap_or_else(|| self.gerrit_url.clone()),
            http_port: overlay.http_port.unwrap_or(self.http_port),
            display: overlay.display.unwrap_or_else(|| self.display.clone()),
            provision: ProvisionPlan {
                packages: overlay
                    .provision
                    .packages
                    .unwrap_or_else(|| self.provision.packages.clone()),
                clones: overlay
                    .provision
                    .clones
                    .unwrap_or_else(|| self.provision.clones.clone()),
                services: overlay
                    .provision
                    .services
                    .unwrap_or_else(|| self.provision.services.clone()),
            },
            environments,
            envlist: EnvLists {
                default: overlay
                    .envlist
                    .default
                    .unwrap_or_else(|| self.envlist.default.clone()),
                ci: overlay.envlist.ci.unwrap_or_else(|| self.envlist.ci.clone()),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory holding `.quibble.toml`
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                debug!("loading global config {}", global_path.display());
                current = current.merge_with(load_raw_settings(&global_path)?);
            }
        }

        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                debug!("loading local config {}", local_path.display());
                current = current.merge_with(load_raw_settings(&local_path)?);
            }
        }

        current = current.with_env_overrides(None)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply QUIBBLE_* variables as explicit overrides.
    ///
    /// `vars` replaces the process environment when given.
    pub fn with_env_overrides(
        mut self,
        vars: Option<Map<String, String>>,
    ) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("QUIBBLE")
                    .prefix_separator("_")
                    .separator("__")
                    .source(vars),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("git_cache") {
            self.git_cache = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("log_dir") {
            self.log_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("gerrit_url") {
            self.gerrit_url = val;
        }
        if let Ok(val) = config.get_string("http_port") {
            self.http_port = val.parse().map_err(|e| ApplicationError::Config {
                message: format!("QUIBBLE_HTTP_PORT={val}: {e}"),
            })?;
        }
        if let Ok(val) = config.get_string("display") {
            self.display = val;
        }

        Ok(self)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# quibble configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/quibble/quibble.toml
#   Local:  <project>/.quibble.toml
#   Env:    QUIBBLE_* environment variables (scalars only)
#
# Arrays replace inherited values. Environments merge by name.

# git_cache = "/srv/git"
# log_dir = "log"
# gerrit_url = "https://gerrit.wikimedia.org/r/p"
# http_port = 9412
# display = ":94"

[provision]
# packages = ["git", "mysql-server", "php-cli"]
# services = ["mysql"]
# [[provision.clones]]
# url = "https://gerrit.wikimedia.org/r/mediawiki/core"
# dest = "/srv/git/mediawiki/core.git"

[envlist]
# default = ["lint", "unit", "doc"]
# ci = ["lint", "unit", "integration", "doc"]

# [environments.lint]
# deps = "test-requirements.txt"
# install = [["python3", "-m", "venv", "{envdir}"], ["{envdir}/bin/pip", "install", "-r", "{deps}"]]
# commands = [["flake8"]]
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_config_when_loading_then_uses_defaults() {
        let settings = Settings::load(None).expect("load defaults");
        assert_eq!(settings.provision.clones.len(), 3);
        assert!(settings.environment_set().validate().is_ok());
    }

    #[test]
    fn given_docker_when_resolving_defaults_then_uses_srv_git_and_log() {
        let settings = Settings::default();
        assert_eq!(settings.git_cache_or_default(true), PathBuf::from("/srv/git"));
        assert_eq!(settings.git_cache_or_default(false), PathBuf::from("ref"));
        assert_eq!(settings.log_dir_or_default(true), PathBuf::from("/log"));
        assert_eq!(settings.log_dir_or_default(false), PathBuf::from("log"));
    }

    #[test]
    fn given_overlay_when_merging_then_arrays_replace_and_environments_merge() {
        let raw: RawSettings = toml::from_str(
            r#"
http_port = 8080
[provision]
services = []
[envlist]
ci = ["lint"]
[environments.shell]
commands = [["true"]]
"#,
        )
        .unwrap();

        let merged = Settings::default().merge_with(raw);

        assert_eq!(merged.http_port, 8080);
        assert!(merged.provision.services.is_empty());
        assert_eq!(merged.provision.packages, ProvisionPlan::default().packages);
        assert_eq!(merged.envlist.ci, vec!["lint".to_string()]);
        assert_eq!(merged.envlist.default, EnvLists::default().default);
        assert!(merged.environments.contains_key("shell"));
        assert!(merged.environments.contains_key("lint"));
    }

    #[test]
    fn given_tilde_in_git_cache_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            git_cache: Some(PathBuf::from("~/git")),
            ..Default::default()
        };
        settings.expand_paths();
        let home = std::env::var("HOME").expect("HOME should be set");
        let cache = settings.git_cache.unwrap();
        assert!(cache.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn given_defaults_when_serializing_then_valid_toml() {
        let toml = Settings::default().to_toml().unwrap();
        assert!(toml.contains("http_port = 9412"));
    }
}
