//! MediaWiki run rules: repositories to clone, composer files, install arguments

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};

use crate::domain::{DbEngine, DomainError, ProjectKind, CORE, VECTOR, VENDOR};

/// Separator of `SKIN_DEPENDENCIES` / `EXT_DEPENDENCIES`: a literal backslash followed by `n`.
pub const DEPENDENCIES_SEPARATOR: &str = "\\n";

/// Projects to clone, in clone order.
///
/// `mediawiki/core` comes first since the others are cloned inside it.
pub fn repos_to_clone(
    projects: &[String],
    clone_vendor: bool,
    env: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut deps = vec![CORE.to_string(), VECTOR.to_string()];
    if clone_vendor {
        deps.push(VENDOR.to_string());
    }

    if let Some(zuul_project) = env.get("ZUUL_PROJECT") {
        if !deps.contains(zuul_project) {
            deps.push(zuul_project.clone());
        }
    }

    for var in ["SKIN_DEPENDENCIES", "EXT_DEPENDENCIES"] {
        if let Some(value) = env.get(var) {
            deps.extend(value.split(DEPENDENCIES_SEPARATOR).map(String::from));
        }
    }

    deps.extend(projects.iter().cloned());
    deps
}

/// `composer.local.json` letting the merge plugin pick up extension requirements.
pub fn composer_local(dependencies: &[String]) -> Value {
    let include: Vec<String> = dependencies
        .iter()
        .map(|d| d.trim())
        .filter(|d| ProjectKind::of(d) == ProjectKind::Extension)
        .map(|d| format!("{}/composer.json", d.trim_start_matches("mediawiki/")))
        .collect();
    json!({ "extra": { "merge-plugin": { "include": include } } })
}

/// `require-dev` entries of a composer.json as `name=version` arguments.
pub fn composer_dev_requirements(composer: &Value) -> Result<Vec<String>, DomainError> {
    let require_dev = composer
        .get("require-dev")
        .and_then(Value::as_object)
        .ok_or(DomainError::MissingRequireDev)?;
    Ok(require_dev
        .iter()
        .map(|(name, version)| {
            let version = version
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| version.to_string());
            format!("{name}={version}")
        })
        .collect())
}

/// Connection details of a started database backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConnection {
    pub engine: DbEngine,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Host or socket for network engines
    pub dbserver: String,
    /// Data directory; sqlite keeps its database files there
    pub datadir: String,
}

/// Arguments to `maintenance/install.php` for a database backend.
pub fn install_args(db: &DbConnection) -> Vec<String> {
    let mut args = vec![
        "--scriptpath=".to_string(),
        format!("--dbtype={}", db.engine),
        format!("--dbname={}", db.dbname),
    ];
    match db.engine {
        DbEngine::Sqlite => args.push(format!("--dbpath={}", db.datadir)),
        DbEngine::Mysql | DbEngine::Postgres => {
            args.push(format!("--dbuser={}", db.user));
            args.push(format!("--dbpass={}", db.password));
            args.push(format!("--dbserver={}", db.dbserver));
        }
    }
    args
}

/// Environment variables every command of a run sees.
///
/// `EXECUTOR_NUMBER` defaults to 1. `WORKSPACE` is forced in Docker and only
/// filled in elsewhere when absent, since some code relies on it to detect CI.
pub fn run_environment(
    env: &BTreeMap<String, String>,
    in_docker: bool,
    workspace: &Path,
    mw_install_path: &Path,
    log_dir: &Path,
) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    if !env.contains_key("EXECUTOR_NUMBER") {
        vars.insert("EXECUTOR_NUMBER".to_string(), "1".to_string());
    }
    if in_docker || !env.contains_key("WORKSPACE") {
        vars.insert("WORKSPACE".to_string(), workspace.display().to_string());
    }
    vars.insert(
        "MW_INSTALL_PATH".to_string(),
        mw_install_path.display().to_string(),
    );
    vars.insert("MW_LOG_DIR".to_string(), log_dir.display().to_string());
    vars.insert("LOG_DIR".to_string(), log_dir.display().to_string());
    vars.insert("TMPDIR".to_string(), "/tmp".to_string());
    vars
}

/// Zuul project under test; falls back to core when unset.
pub fn zuul_project(env: &BTreeMap<String, String>) -> (String, bool) {
    match env.get("ZUUL_PROJECT") {
        Some(p) => (p.clone(), true),
        None => (CORE.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn given_no_env_when_listing_repos_then_core_and_vector() {
        let repos = repos_to_clone(&[], false, &BTreeMap::new());
        assert_eq!(repos, vec![CORE.to_string(), VECTOR.to_string()]);
    }

    #[test]
    fn given_vendor_and_zuul_project_when_listing_repos_then_appended_in_order() {
        let env = env(&[("ZUUL_PROJECT", "mediawiki/extensions/Cite")]);
        let repos = repos_to_clone(&["mediawiki/extensions/Echo".to_string()], true, &env);
        assert_eq!(
            repos,
            vec![
                "mediawiki/core",
                "mediawiki/skins/Vector",
                "mediawiki/vendor",
                "mediawiki/extensions/Cite",
                "mediawiki/extensions/Echo",
            ]
        );
    }

    #[test]
    fn given_zuul_project_already_listed_when_listing_repos_then_not_duplicated() {
        let env = env(&[("ZUUL_PROJECT", "mediawiki/core")]);
        let repos = repos_to_clone(&[], false, &env);
        assert_eq!(repos.iter().filter(|r| *r == CORE).count(), 1);
    }

    #[test]
    fn given_dependency_variables_when_listing_repos_then_split_on_literal_backslash_n() {
        let env = env(&[
            ("EXT_DEPENDENCIES", "mediawiki/extensions/A\\nmediawiki/extensions/B"),
            ("SKIN_DEPENDENCIES", "mediawiki/skins/C"),
        ]);
        let repos = repos_to_clone(&[], false, &env);
        assert_eq!(
            &repos[2..],
            &[
                "mediawiki/skins/C".to_string(),
                "mediawiki/extensions/A".to_string(),
                "mediawiki/extensions/B".to_string(),
            ]
        );
    }

    #[test]
    fn given_mixed_dependencies_when_building_composer_local_then_only_extensions() {
        let deps = vec![
            "mediawiki/core".to_string(),
            " mediawiki/extensions/Cite ".to_string(),
            "mediawiki/skins/Vector".to_string(),
        ];
        let value = composer_local(&deps);
        assert_eq!(
            value,
            json!({"extra": {"merge-plugin": {"include": ["extensions/Cite/composer.json"]}}})
        );
    }

    #[test]
    fn given_require_dev_when_listing_requirements_then_name_equals_version() {
        let composer = json!({"require-dev": {"phpunit/phpunit": "4.8.36", "jakub-onderka/php-parallel-lint": "0.9.2"}});
        let mut reqs = composer_dev_requirements(&composer).unwrap();
        reqs.sort();
        assert_eq!(
            reqs,
            vec![
                "jakub-onderka/php-parallel-lint=0.9.2".to_string(),
                "phpunit/phpunit=4.8.36".to_string(),
            ]
        );
    }

    #[test]
    fn given_no_require_dev_when_listing_requirements_then_errors() {
        let err = composer_dev_requirements(&json!({})).unwrap_err();
        assert_eq!(err, DomainError::MissingRequireDev);
    }

    #[test]
    fn given_sqlite_when_building_install_args_then_uses_dbpath() {
        let db = DbConnection {
            engine: DbEngine::Sqlite,
            dbname: "wikidb".into(),
            user: String::new(),
            password: String::new(),
            dbserver: String::new(),
            datadir: "/tmp/db".into(),
        };
        assert_eq!(
            install_args(&db),
            vec!["--scriptpath=", "--dbtype=sqlite", "--dbname=wikidb", "--dbpath=/tmp/db"]
        );
    }

    #[test]
    fn given_mysql_when_building_install_args_then_uses_credentials() {
        let db = DbConnection {
            engine: DbEngine::Mysql,
            dbname: "wikidb".into(),
            user: "wikiuser".into(),
            password: "secret".into(),
            dbserver: "localhost:/tmp/db/socket".into(),
            datadir: "/tmp/db".into(),
        };
        let args = install_args(&db);
        assert_eq!(args[1], "--dbtype=mysql");
        assert_eq!(&args[3..], &["--dbuser=wikiuser", "--dbpass=secret", "--dbserver=localhost:/tmp/db/socket"]);
    }

    #[test]
    fn given_workspace_set_outside_docker_when_building_env_then_keeps_it() {
        let env = env(&[("WORKSPACE", "/jenkins"), ("EXECUTOR_NUMBER", "3")]);
        let vars = run_environment(&env, false, Path::new("/ws"), Path::new("/ws/src"), Path::new("/ws/log"));
        assert!(!vars.contains_key("WORKSPACE"));
        assert!(!vars.contains_key("EXECUTOR_NUMBER"));
        assert_eq!(vars["MW_INSTALL_PATH"], "/ws/src");
        assert_eq!(vars["LOG_DIR"], "/ws/log");
        assert_eq!(vars["TMPDIR"], "/tmp");
    }

    #[test]
    fn given_docker_when_building_env_then_forces_workspace() {
        let env = env(&[("WORKSPACE", "/jenkins")]);
        let vars = run_environment(&env, true, Path::new("/workspace"), Path::new("/workspace/src"), Path::new("/log"));
        assert_eq!(vars["WORKSPACE"], "/workspace");
        assert_eq!(vars["EXECUTOR_NUMBER"], "1");
    }
}
