//! Domain entities: core data structures

use std::fmt;
use std::str::FromStr;

use crate::domain::DomainError;

/// Database backend MediaWiki gets installed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbEngine {
    Sqlite,
    #[default]
    Mysql,
    Postgres,
}

impl DbEngine {
    pub const ALL: [DbEngine; 3] = [DbEngine::Sqlite, DbEngine::Mysql, DbEngine::Postgres];

    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::Sqlite => "sqlite",
            DbEngine::Mysql => "mysql",
            DbEngine::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DbEngine::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("invalid database '{s}' (choose from sqlite, mysql, postgres)"))
    }
}

/// Where PHP dependencies come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackagesSource {
    /// `composer update` against packagist
    Composer,
    /// The mediawiki/vendor repository
    #[default]
    Vendor,
}

impl PackagesSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackagesSource::Composer => "composer",
            PackagesSource::Vendor => "vendor",
        }
    }
}

impl fmt::Display for PackagesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackagesSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "composer" => Ok(PackagesSource::Composer),
            "vendor" => Ok(PackagesSource::Vendor),
            other => Err(format!(
                "invalid packages source '{other}' (choose from composer, vendor)"
            )),
        }
    }
}

/// Built-in test command of a MediaWiki run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Phpunit,
    NpmTest,
    ComposerTest,
    Qunit,
    Selenium,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Phpunit,
        Stage::NpmTest,
        Stage::ComposerTest,
        Stage::Qunit,
        Stage::Selenium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Phpunit => "phpunit",
            Stage::NpmTest => "npm-test",
            Stage::ComposerTest => "composer-test",
            Stage::Qunit => "qunit",
            Stage::Selenium => "selenium",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStage(s.to_string()))
    }
}

/// Keyword selecting every stage in `--run` / `--skip`.
pub const ALL_STAGES: &str = "all";

/// Which stages a run executes, from `--run`, `--skip` and `--commands`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSelection {
    run: Vec<String>,
    skip: Vec<String>,
    has_commands: bool,
}

impl Default for StageSelection {
    fn default() -> Self {
        Self {
            run: vec![ALL_STAGES.to_string()],
            skip: vec![],
            has_commands: false,
        }
    }
}

impl StageSelection {
    /// Build a selection, rejecting names that are neither a stage nor `all`.
    pub fn new(run: Vec<String>, skip: Vec<String>, has_commands: bool) -> Result<Self, DomainError> {
        for name in run.iter().chain(skip.iter()) {
            if name != ALL_STAGES {
                name.parse::<Stage>()?;
            }
        }
        Ok(Self {
            run,
            skip,
            has_commands,
        })
    }

    pub fn should_run(&self, stage: Stage) -> bool {
        if self.has_commands {
            return false;
        }
        let name = stage.as_str();
        if self.skip.iter().any(|s| s == ALL_STAGES || s == name) {
            return false;
        }
        if self.run.iter().any(|s| s == ALL_STAGES) {
            return true;
        }
        self.run.iter().any(|s| s == name)
    }

    /// Stages that will run, in execution order.
    pub fn selected(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.should_run(*s))
            .collect()
    }
}

pub const CORE: &str = "mediawiki/core";
pub const VENDOR: &str = "mediawiki/vendor";
pub const VECTOR: &str = "mediawiki/skins/Vector";
const EXTENSIONS_PREFIX: &str = "mediawiki/extensions/";
const SKINS_PREFIX: &str = "mediawiki/skins/";

/// Classification of a Gerrit project name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectKind {
    Core,
    Vendor,
    Extension,
    Skin,
    Other,
}

impl ProjectKind {
    pub fn of(project: &str) -> Self {
        if project == CORE {
            ProjectKind::Core
        } else if project == VENDOR {
            ProjectKind::Vendor
        } else if project.starts_with(EXTENSIONS_PREFIX) {
            ProjectKind::Extension
        } else if project.starts_with(SKINS_PREFIX) {
            ProjectKind::Skin
        } else {
            ProjectKind::Other
        }
    }

    pub fn is_core_or_vendor(&self) -> bool {
        matches!(self, ProjectKind::Core | ProjectKind::Vendor)
    }

    pub fn is_ext_or_skin(&self) -> bool {
        matches!(self, ProjectKind::Extension | ProjectKind::Skin)
    }

    /// PHPUnit testsuite covering this kind of project.
    pub fn phpunit_testsuite(&self) -> Option<&'static str> {
        match self {
            ProjectKind::Extension => Some("extensions"),
            ProjectKind::Skin => Some("skins"),
            _ => None,
        }
    }
}

/// Directory of a project relative to the MediaWiki installation.
pub fn repo_dir(project: &str) -> String {
    match ProjectKind::of(project) {
        ProjectKind::Core => ".".to_string(),
        ProjectKind::Vendor => "vendor".to_string(),
        ProjectKind::Extension | ProjectKind::Skin => project
            .strip_prefix("mediawiki/")
            .unwrap_or(project)
            .to_string(),
        ProjectKind::Other => project.to_string(),
    }
}

/// Expand `~`, `$VAR` and `${VAR}`; leaves the input as-is when expansion fails.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
