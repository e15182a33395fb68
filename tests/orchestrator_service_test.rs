//! Tests for OrchestratorService

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;

use quibble::application::services::OrchestratorService;
use quibble::application::ApplicationError;
use quibble::domain::{DomainError, EnvLists, EnvironmentSet, RunContext, TestEnvironment};
use quibble::infrastructure::traits::RealFileSystem;
use quibble::util::testing::{init_test_setup, FakeCommandRunner, Invocation};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn env_with(commands: &[&[&str]]) -> TestEnvironment {
    TestEnvironment {
        commands: commands.iter().map(|c| argv(c)).collect(),
        ..Default::default()
    }
}

fn names(list: &[&str]) -> Vec<String> {
    argv(list)
}

/// Three environments: lint, unit (with deps), doc.
fn test_set() -> EnvironmentSet {
    let mut environments = BTreeMap::new();
    environments.insert("lint".to_string(), env_with(&[&["flake8"]]));
    environments.insert(
        "unit".to_string(),
        TestEnvironment {
            deps: Some(PathBuf::from("requirements.txt")),
            install: vec![argv(&["{envdir}/bin/pip", "install", "-r", "{deps}"])],
            commands: vec![argv(&["pytest", "{posargs}"])],
            ..Default::default()
        },
    );
    environments.insert("doc".to_string(), env_with(&[&["sphinx-build", "doc"], &["linkcheck"]]));
    EnvironmentSet {
        environments,
        envlist: EnvLists {
            default: names(&["lint", "unit", "doc"]),
            ci: names(&["lint", "unit", "doc"]),
        },
    }
}

fn service(runner: &FakeCommandRunner) -> OrchestratorService {
    OrchestratorService::new(Arc::new(RealFileSystem), Arc::new(runner.clone()))
}

// ============================================================
// run() tests
// ============================================================

#[test]
fn given_passing_environments_when_run_then_all_run_in_list_order() {
    init_test_setup();
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new();
    let set = test_set();

    // Act
    let passed = service(&runner)
        .run(&set, &names(&["lint", "unit", "doc"]), temp.path(), &[], Some("/usr/bin"))
        .unwrap();

    // Assert
    assert_eq!(passed, names(&["lint", "unit", "doc"]));
    let programs: Vec<String> = runner
        .calls()
        .iter()
        .map(|c| c.command().program.clone())
        .collect();
    let pip = temp.path().join(".quibble/unit/bin/pip").display().to_string();
    assert_eq!(programs, vec!["flake8".to_string(), pip, "pytest".to_string(), "sphinx-build".to_string(), "linkcheck".to_string()]);
    assert!(temp.path().join(".quibble/lint").is_dir());
    assert!(temp.path().join(".quibble/unit").is_dir());
}

#[test]
fn given_failing_environment_when_run_then_halts_and_keeps_exit_code() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new().fail_when("pytest", 5);

    // Act
    let err = service(&runner)
        .run(&test_set(), &names(&["lint", "unit", "doc"]), temp.path(), &[], None)
        .unwrap_err();

    // Assert
    assert_eq!(err.command_exit_code(), Some(5));
    assert!(matches!(err, ApplicationError::EnvironmentFailed { ref env, .. } if env == "unit"));
    assert!(!runner.lines().iter().any(|l| l.starts_with("sphinx-build")));
    assert!(!temp.path().join(".quibble/doc").exists());
}

#[test]
fn given_first_command_failing_when_run_then_second_command_of_same_env_skipped() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new().fail_when("sphinx-build", 1);

    // Act
    let err = service(&runner)
        .run(&test_set(), &names(&["doc"]), temp.path(), &[], None)
        .unwrap_err();

    // Assert
    assert_eq!(err.command_exit_code(), Some(1));
    assert_eq!(runner.lines().len(), 1);
}

#[test]
fn given_posargs_when_run_then_spliced_into_command() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new();

    // Act
    service(&runner)
        .run(&test_set(), &names(&["unit"]), temp.path(), &argv(&["-k", "slow"]), None)
        .unwrap();

    // Assert
    let last = runner.calls().last().cloned().unwrap();
    let Invocation::Run(cmd) = last else {
        panic!("expected a run invocation");
    };
    assert_eq!(cmd.program, "pytest");
    assert_eq!(cmd.args, argv(&["-k", "slow"]));
    assert_eq!(cmd.cwd.as_deref(), Some(temp.path()));
    let envdir = temp.path().join(".quibble/unit");
    assert_eq!(cmd.env["VIRTUAL_ENV"], envdir.display().to_string());
    assert_eq!(cmd.env["PATH"], envdir.join("bin").display().to_string());
}

#[test]
fn given_unknown_name_when_run_then_nothing_runs() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new();

    // Act
    let err = service(&runner)
        .run(&test_set(), &names(&["lint", "nope"]), temp.path(), &[], None)
        .unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::UnknownEnvironment { ref names, .. }) if names == "nope"
    ));
    assert!(runner.calls().is_empty());
}

#[test]
fn given_envlist_with_undefined_environment_when_run_then_config_error() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let runner = FakeCommandRunner::new();
    let mut set = test_set();
    set.envlist.ci.push("typo".to_string());

    // Act
    let err = service(&runner)
        .run(&set, &names(&["lint"]), temp.path(), &[], None)
        .unwrap_err();

    // Assert
    assert!(matches!(
        err,
        ApplicationError::Domain(DomainError::UnknownEnvironment { ref list, .. }) if list == "ci"
    ));
    assert!(runner.calls().is_empty());
}

// ============================================================
// context selection
// ============================================================

#[rstest]
#[case(false, &[], RunContext::Interactive)]
#[case(true, &[], RunContext::Ci)]
#[case(false, &[("CI", "true")], RunContext::Ci)]
#[case(false, &[("ZUUL_PROJECT", "mediawiki/core")], RunContext::Ci)]
fn given_caller_context_when_detecting_then_selects_list(
    #[case] force_ci: bool,
    #[case] vars: &[(&str, &str)],
    #[case] expected: RunContext,
) {
    let env: BTreeMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(RunContext::detect(force_ci, &env), expected);
}
