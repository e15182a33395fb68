//! Named test environments and the env lists selecting them

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{CommandLine, DomainError};

const ENVDIR: &str = "{envdir}";
const DEPS: &str = "{deps}";
const POSARGS: &str = "{posargs}";

/// Directory holding environments without an explicit `envdir`, relative to the project.
pub const DEFAULT_ENVS_DIR: &str = ".quibble";

/// An isolated dependency set paired with the command lines to run in it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TestEnvironment {
    pub description: Option<String>,
    /// Isolation directory (default: `.quibble/<name>`)
    pub envdir: Option<PathBuf>,
    /// Dependency manifest installed before the commands run
    pub deps: Option<PathBuf>,
    /// Commands installing `deps` into `envdir`
    pub install: Vec<Vec<String>>,
    pub commands: Vec<Vec<String>>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn python_env(description: &str, deps: &str, commands: Vec<Vec<String>>) -> TestEnvironment {
    TestEnvironment {
        description: Some(description.to_string()),
        envdir: None,
        deps: Some(PathBuf::from(deps)),
        install: vec![
            argv(&["python3", "-m", "venv", ENVDIR]),
            argv(&["{envdir}/bin/pip", "install", "-r", DEPS]),
        ],
        commands,
    }
}

/// Ordered environment names for interactive and CI callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvLists {
    pub default: Vec<String>,
    pub ci: Vec<String>,
}

impl Default for EnvLists {
    fn default() -> Self {
        Self {
            default: argv(&["lint", "unit", "doc"]),
            ci: argv(&["lint", "unit", "integration", "doc"]),
        }
    }
}

/// Who invoked the orchestrator; picks the env list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunContext {
    Interactive,
    Ci,
}

impl RunContext {
    /// `Ci` when forced or when a CI caller left its marker variables.
    pub fn detect(force_ci: bool, env: &BTreeMap<String, String>) -> Self {
        if force_ci || env.contains_key("CI") || env.contains_key("ZUUL_PROJECT") {
            RunContext::Ci
        } else {
            RunContext::Interactive
        }
    }
}

/// Resolved invocation plan of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPlan {
    pub name: String,
    pub envdir: PathBuf,
    pub install: Vec<CommandLine>,
    pub commands: Vec<CommandLine>,
}

/// All environments known to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentSet {
    pub environments: BTreeMap<String, TestEnvironment>,
    pub envlist: EnvLists,
}

impl Default for EnvironmentSet {
    fn default() -> Self {
        let mut environments = BTreeMap::new();
        environments.insert(
            "lint".to_string(),
            python_env("Static analysis", "test-requirements.txt", vec![argv(&["flake8"])]),
        );
        environments.insert(
            "unit".to_string(),
            python_env(
                "Unit tests",
                "test-requirements.txt",
                vec![argv(&["nosetests", "--attr", "!integration", POSARGS])],
            ),
        );
        environments.insert(
            "integration".to_string(),
            python_env(
                "Integration tests",
                "test-requirements.txt",
                vec![argv(&["nosetests", "--attr", "integration", POSARGS])],
            ),
        );
        environments.insert(
            "cover".to_string(),
            python_env(
                "Unit tests with coverage report",
                "test-requirements.txt",
                vec![argv(&[
                    "nosetests",
                    "--with-coverage",
                    "--cover-package=quibble",
                    "--cover-html",
                    POSARGS,
                ])],
            ),
        );
        environments.insert(
            "doc".to_string(),
            python_env(
                "Build documentation",
                "doc/requirements.txt",
                vec![argv(&["sphinx-build", "-W", "-b", "html", "doc/source", "doc/build/html"])],
            ),
        );
        environments.insert(
            "venv".to_string(),
            python_env("Free-form command", "requirements.txt", vec![argv(&[POSARGS])]),
        );
        Self {
            environments,
            envlist: EnvLists::default(),
        }
    }
}

impl EnvironmentSet {
    /// Both env lists must only reference defined environments.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.check_names("default", &self.envlist.default)?;
        self.check_names("ci", &self.envlist.ci)
    }

    fn check_names(&self, list: &str, names: &[String]) -> Result<(), DomainError> {
        let unknown: BTreeSet<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !self.environments.contains_key(*n))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(DomainError::UnknownEnvironment {
                list: list.to_string(),
                names: unknown.into_iter().collect::<Vec<_>>().join(", "),
            })
        }
    }

    pub fn select(&self, context: RunContext) -> &[String] {
        match context {
            RunContext::Interactive => &self.envlist.default,
            RunContext::Ci => &self.envlist.ci,
        }
    }

    /// Lists (`default`, `ci`) referencing an environment.
    pub fn lists_containing(&self, name: &str) -> Vec<&'static str> {
        let mut lists = Vec::new();
        if self.envlist.default.iter().any(|n| n == name) {
            lists.push("default");
        }
        if self.envlist.ci.iter().any(|n| n == name) {
            lists.push("ci");
        }
        lists
    }

    /// Resolve environment `name` rooted at `root`, splicing `posargs`.
    pub fn plan(&self, name: &str, root: &Path, posargs: &[String]) -> Result<EnvPlan, DomainError> {
        let env = self.environments.get(name).ok_or_else(|| DomainError::UnknownEnvironment {
            list: "command line".to_string(),
            names: name.to_string(),
        })?;

        let envdir = match &env.envdir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => root.join(dir),
            None => root.join(DEFAULT_ENVS_DIR).join(name),
        };
        let deps = env.deps.as_ref().map(|d| root.join(d));

        let install = match &deps {
            Some(deps) => env
                .install
                .iter()
                .filter_map(|a| substitute(a, &envdir, Some(deps.as_path()), &[]))
                .map(|c| c.current_dir(root))
                .collect(),
            None => vec![],
        };
        let commands: Vec<CommandLine> = env
            .commands
            .iter()
            .filter_map(|a| substitute(a, &envdir, deps.as_deref(), posargs))
            .map(|c| c.current_dir(root))
            .collect();
        if commands.is_empty() {
            return Err(DomainError::EmptyEnvironment(name.to_string()));
        }

        Ok(EnvPlan {
            name: name.to_string(),
            envdir,
            install,
            commands,
        })
    }
}

/// Replace placeholders in one argv; `None` when nothing is left to run.
fn substitute(
    argv: &[String],
    envdir: &Path,
    deps: Option<&Path>,
    posargs: &[String],
) -> Option<CommandLine> {
    let envdir = envdir.to_string_lossy();
    let deps = deps.map(|d| d.to_string_lossy().into_owned()).unwrap_or_default();
    let expanded: Vec<String> = argv
        .iter()
        .flat_map(|arg| {
            if arg == POSARGS {
                posargs.to_vec()
            } else {
                vec![arg.replace(ENVDIR, &envdir).replace(DEPS, &deps)]
            }
        })
        .collect();
    CommandLine::from_argv(&expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_default_set_when_validating_then_ok() {
        let set = EnvironmentSet::default();
        assert!(set.validate().is_ok());
        for name in ["lint", "unit", "integration", "cover", "doc", "venv"] {
            assert!(set.environments.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn given_ci_list_with_unknown_env_when_validating_then_names_it() {
        let mut set = EnvironmentSet::default();
        set.envlist.ci.push("py27".into());
        set.envlist.ci.push("bogus".into());
        let err = set.validate().unwrap_err();
        assert_eq!(
            err,
            DomainError::UnknownEnvironment {
                list: "ci".into(),
                names: "bogus, py27".into()
            }
        );
    }

    #[test]
    fn given_ci_marker_when_detecting_context_then_ci() {
        let mut env = BTreeMap::new();
        assert_eq!(RunContext::detect(false, &env), RunContext::Interactive);
        assert_eq!(RunContext::detect(true, &env), RunContext::Ci);
        env.insert("ZUUL_PROJECT".to_string(), "mediawiki/core".to_string());
        assert_eq!(RunContext::detect(false, &env), RunContext::Ci);
    }

    #[test]
    fn given_posargs_when_planning_then_spliced_into_command() {
        let set = EnvironmentSet::default();
        let root = Path::new("/work");
        let plan = set
            .plan("unit", root, &["tests/test_cmd.py".to_string()])
            .unwrap();
        assert_eq!(plan.envdir, PathBuf::from("/work/.quibble/unit"));
        assert_eq!(
            plan.commands[0].to_string(),
            "nosetests --attr !integration tests/test_cmd.py"
        );
        assert_eq!(
            plan.install[1].to_string(),
            "/work/.quibble/unit/bin/pip install -r /work/test-requirements.txt"
        );
    }

    #[test]
    fn given_venv_without_posargs_when_planning_then_errors() {
        let set = EnvironmentSet::default();
        let err = set.plan("venv", Path::new("/work"), &[]).unwrap_err();
        assert_eq!(err, DomainError::EmptyEnvironment("venv".into()));
    }

    #[test]
    fn given_env_without_deps_when_planning_then_no_install() {
        let mut set = EnvironmentSet::default();
        set.environments.insert(
            "shell".into(),
            TestEnvironment {
                commands: vec![vec!["true".into()]],
                install: vec![vec!["pip".into(), "install".into()]],
                ..Default::default()
            },
        );
        let plan = set.plan("shell", Path::new("/work"), &[]).unwrap();
        assert!(plan.install.is_empty());
    }
}
