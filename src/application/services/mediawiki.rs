//! MediaWiki test run
//!
//! Clones MediaWiki and its dependencies, installs it against a database
//! backend and runs the selected test stages (or user commands) in order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::application::exec::check_call;
use crate::application::services::backends::{Backends, Database};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::mediawiki::{
    composer_dev_requirements, composer_local, install_args, repos_to_clone, run_environment,
    zuul_project,
};
use crate::domain::{
    repo_dir, CommandLine, DbEngine, DomainError, PackagesSource, ProjectKind, Stage,
    StageSelection,
};
use crate::infrastructure::traits::{CommandRunner, FileSystem};

const PHPUNIT: &str = "tests/phpunit/phpunit.php";
const PHPUNIT_EXCLUDED: &str = "Broken,ParserFuzz,Stub";

/// PHP prepended to the generated LocalSettings.php.
const EXTRA_SETTINGS: &str = r#"<?php
// Injected by quibble
error_reporting( -1 );
ini_set( 'display_errors', 1 );
$wgShowExceptionDetails = true;
$wgShowDBErrorBacktrace = true;
$wgDevelopmentWarnings = true;
$wgDebugLogFile = getenv( 'MW_LOG_DIR' ) . '/mw-debug-www.log';
$wgDBerrorLog = getenv( 'MW_LOG_DIR' ) . '/mw-dberror.log';
$wgRateLimits = [];
?>
"#;

/// Parameters of a run, resolved from the CLI and settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub packages_source: PackagesSource,
    pub skip_zuul: bool,
    pub skip_deps: bool,
    pub db: DbEngine,
    pub git_cache: PathBuf,
    pub workspace: PathBuf,
    /// Relative paths are resolved against the workspace
    pub log_dir: PathBuf,
    pub projects: Vec<String>,
    pub stages: StageSelection,
    pub commands: Vec<String>,
    pub in_docker: bool,
    pub http_port: u16,
    pub display: String,
    pub gerrit_url: String,
}

/// Paths and environment shared by every step of one run.
struct RunState<'a> {
    opts: &'a RunOptions,
    mw_install_path: PathBuf,
    log_dir: PathBuf,
    vars: BTreeMap<String, String>,
    zuul_project: String,
    dependencies: Vec<String>,
}

impl RunState<'_> {
    /// Command running in the MediaWiki directory with the run environment.
    fn mw(&self, program: &str, args: &[&str]) -> CommandLine {
        self.in_dir(&self.mw_install_path, program, args)
    }

    fn in_dir(&self, dir: &Path, program: &str, args: &[&str]) -> CommandLine {
        CommandLine::new(program, args.iter().copied())
            .current_dir(dir)
            .envs(&self.vars)
    }

    fn server(&self) -> String {
        format!("http://127.0.0.1:{}", self.opts.http_port)
    }

    fn junit(&self, name: &str) -> String {
        format!("--log-junit={}", self.log_dir.join(name).display())
    }
}

/// Drives a full MediaWiki test run.
pub struct MediaWikiService {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
    backends: Backends,
    /// Snapshot of the process environment
    env: BTreeMap<String, String>,
}

impl MediaWikiService {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        backends: Backends,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            fs,
            cmd,
            backends,
            env,
        }
    }

    fn call(&self, cmd: &CommandLine) -> ApplicationResult<()> {
        check_call(self.cmd.as_ref(), cmd)
    }

    fn copylog(&self, ctx: &RunState, src: &Path, dest: &str) -> ApplicationResult<()> {
        let dest = ctx.log_dir.join(dest);
        info!("copying {} to {}", src.display(), dest.display());
        self.fs.copy(src, &dest).with_path_context("copy log", src)?;
        Ok(())
    }

    #[instrument(skip_all, fields(db = %opts.db, packages = %opts.packages_source))]
    pub fn execute(&self, opts: &RunOptions) -> ApplicationResult<()> {
        debug!(
            "running stages: {}",
            opts.stages.selected().iter().join(", ")
        );

        let mw_install_path = opts.workspace.join("src");
        let log_dir = opts.workspace.join(&opts.log_dir);
        self.fs
            .create_dir_all(&log_dir)
            .with_path_context("create log dir", &log_dir)?;

        let vars = run_environment(
            &self.env,
            opts.in_docker,
            &opts.workspace,
            &mw_install_path,
            &log_dir,
        );

        let (zuul_project, from_env) = zuul_project(&self.env);
        if from_env {
            debug!("ZUUL_PROJECT={zuul_project}");
        } else {
            warn!("ZUUL_PROJECT not set. Assuming {zuul_project}");
        }

        let dependencies = repos_to_clone(
            &opts.projects,
            opts.packages_source == PackagesSource::Vendor,
            &self.env,
        );
        info!("Projects: {}", dependencies.join(", "));

        let ctx = RunState {
            opts,
            mw_install_path,
            log_dir,
            vars,
            zuul_project,
            dependencies,
        };
        self.run(&ctx)
    }

    fn run(&self, ctx: &RunState) -> ApplicationResult<()> {
        let opts = ctx.opts;
        let kind = ProjectKind::of(&ctx.zuul_project);

        if !opts.skip_zuul {
            self.clone_repos(ctx)?;
            self.submodule_update(ctx)?;
        }

        if kind.is_ext_or_skin() {
            let composer = opts.stages.should_run(Stage::ComposerTest);
            let npm = opts.stages.should_run(Stage::NpmTest);
            if composer || npm {
                let project_dir = ctx.mw_install_path.join(repo_dir(&ctx.zuul_project));
                self.run_extskin(ctx, &project_dir, composer, npm)?;
            }
        }

        if !opts.skip_deps && opts.packages_source == PackagesSource::Composer {
            self.create_composer_local(ctx)?;
            info!("Running composer update for mediawiki/core");
            self.call(&ctx.mw(
                "composer",
                &["update", "--ansi", "--no-progress", "--prefer-dist", "--profile", "-v"],
            ))?;
        }

        // held until the end of the run
        let _db = self.mw_install(ctx)?;

        if !opts.skip_deps {
            if opts.packages_source == PackagesSource::Vendor {
                info!("vendor.git used. Requiring composer dev dependencies");
                self.fetch_composer_dev(ctx)?;
            }
            self.call(&ctx.mw("npm", &["prune"]))?;
            self.call(&ctx.mw("npm", &["install"]))?;
        }

        if opts.stages.should_run(Stage::Phpunit) {
            self.phpunit(ctx, kind)?;
        }

        if kind == ProjectKind::Core {
            if opts.stages.should_run(Stage::ComposerTest) {
                self.call(&ctx.mw("composer", &["test"]))?;
            }
            if opts.stages.should_run(Stage::NpmTest) {
                self.call(&ctx.mw("npm", &["test"]))?;
            }
        }

        {
            let _web = self
                .backends
                .start_web_server(&ctx.mw_install_path, opts.http_port, &ctx.vars)?;

            if opts.stages.should_run(Stage::Qunit) {
                self.qunit(ctx)?;
            }

            if opts.stages.should_run(Stage::Selenium)
                && self.fs.is_dir(&ctx.mw_install_path.join("tests/selenium"))
            {
                self.selenium(ctx)?;
            }
        }

        if kind.is_core_or_vendor() && opts.stages.should_run(Stage::Phpunit) {
            info!("PHPUnit Database group");
            let junit = ctx.junit("junit-db.xml");
            self.call(&ctx.mw(
                "php",
                &[PHPUNIT, "--group", "Database", "--exclude-group", PHPUNIT_EXCLUDED, junit.as_str()],
            ))?;
        }

        if !opts.commands.is_empty() {
            info!("User commands");
            for command in &opts.commands {
                self.call(
                    &CommandLine::shell(command.as_str())
                        .current_dir(&ctx.mw_install_path)
                        .envs(&ctx.vars),
                )?;
            }
        }

        Ok(())
    }

    /// Clone all dependencies with zuul-cloner using the git cache.
    fn clone_repos(&self, ctx: &RunState) -> ApplicationResult<()> {
        let map_path = ctx.log_dir.join("zuul-clonemap.json");
        let map = clone_map();
        self.fs
            .write(&map_path, &map.to_string())
            .with_path_context("write clone map", &map_path)?;

        let mut cmd = CommandLine::new(
            "zuul-cloner",
            [
                "--color".to_string(),
                "--verbose".to_string(),
                "--map".to_string(),
                map_path.display().to_string(),
                "--workspace".to_string(),
                ctx.mw_install_path.display().to_string(),
                "--cache-dir".to_string(),
                ctx.opts.git_cache.display().to_string(),
                ctx.opts.gerrit_url.clone(),
            ],
        )
        .envs(&ctx.vars);
        for project in &ctx.dependencies {
            cmd = cmd.arg(project.as_str());
        }
        self.call(&cmd)
    }

    fn submodule_update(&self, ctx: &RunState) -> ApplicationResult<()> {
        info!("Updating git submodules of extensions and skins");
        let script = [
            "git submodule foreach git clean -xdff -q",
            "git submodule update --init --recursive",
            "git submodule status",
        ]
        .join("\n");
        // core submodules are left alone, wmf branches are a mess
        for top in ["extensions", "skins"] {
            let root = ctx.mw_install_path.join(top);
            for gitmodules in self.fs.find_named(&root, ".gitmodules", 2) {
                let Some(repo) = gitmodules.parent() else {
                    continue;
                };
                self.call(&ctx.in_dir(repo, "bash", &["-xe", "-c", script.as_str()]))?;
            }
        }
        Ok(())
    }

    fn run_extskin(
        &self,
        ctx: &RunState,
        project_dir: &Path,
        composer: bool,
        npm: bool,
    ) -> ApplicationResult<()> {
        if composer && self.fs.exists(&project_dir.join("composer.json")) {
            info!("composer test for {}", ctx.zuul_project);
            self.call(&ctx.in_dir(
                project_dir,
                "composer",
                &["install", "--ansi", "--no-progress", "--prefer-dist", "-v"],
            ))?;
            self.call(&ctx.in_dir(project_dir, "composer", &["test"]))?;
        }
        if npm && self.fs.exists(&project_dir.join("package.json")) {
            info!("npm test for {}", ctx.zuul_project);
            self.call(&ctx.in_dir(project_dir, "npm", &["prune"]))?;
            self.call(&ctx.in_dir(project_dir, "npm", &["install", "--no-progress"]))?;
            self.call(&ctx.in_dir(project_dir, "npm", &["test"]))?;
        }
        Ok(())
    }

    fn create_composer_local(&self, ctx: &RunState) -> ApplicationResult<()> {
        info!("composer.local.json for merge plugin");
        let path = ctx.mw_install_path.join("composer.local.json");
        let content = composer_local(&ctx.dependencies).to_string();
        self.fs
            .write(&path, &content)
            .with_path_context("write composer.local.json", &path)?;
        info!("Created composer.local.json");
        Ok(())
    }

    fn mw_install(&self, ctx: &RunState) -> ApplicationResult<Database> {
        let user = self
            .env
            .get("USER")
            .cloned()
            .unwrap_or_else(|| "root".to_string());
        let db = self.backends.start_database(ctx.opts.db, &user)?;

        let mut args = vec!["maintenance/install.php".to_string()];
        args.extend(install_args(&db.connection));
        args.extend(
            ["--pass=testwikijenkinspass", "TestWiki", "WikiAdmin"]
                .into_iter()
                .map(String::from),
        );
        self.call(
            &CommandLine::new("php", args)
                .current_dir(&ctx.mw_install_path)
                .envs(&ctx.vars),
        )?;

        let local_settings = ctx.mw_install_path.join("LocalSettings.php");
        let installed = self
            .fs
            .read_to_string(&local_settings)
            .with_path_context("read LocalSettings.php", &local_settings)?;
        self.fs
            .write(&local_settings, &format!("{EXTRA_SETTINGS}{installed}"))
            .with_path_context("write LocalSettings.php", &local_settings)?;
        self.call(&CommandLine::new(
            "php",
            ["-l".to_string(), local_settings.display().to_string()],
        ))?;
        self.copylog(ctx, &local_settings, "LocalSettings.php")?;

        let mut update = vec!["maintenance/update.php", "--quick"];
        if ctx.opts.packages_source == PackagesSource::Vendor {
            // core and vendor patches depending on each other would never
            // pass the version check
            info!("mediawiki/vendor used. Skipping external dependencies");
            update.push("--skip-external-dependencies");
        }
        self.call(&ctx.mw("php", &update))?;

        Ok(db)
    }

    fn fetch_composer_dev(&self, ctx: &RunState) -> ApplicationResult<()> {
        let mw_composer_json = ctx.mw_install_path.join("composer.json");
        let vendor_dir = ctx.mw_install_path.join("vendor");

        let content = self
            .fs
            .read_to_string(&mw_composer_json)
            .with_path_context("read composer.json", &mw_composer_json)?;
        let composer: Value =
            serde_json::from_str(&content).map_err(|e| ApplicationError::OperationFailed {
                context: format!("parse {}", mw_composer_json.display()),
                source: Box::new(e),
            })?;
        let reqs = composer_dev_requirements(&composer)?;
        debug!("composer require {}", reqs.join(" "));

        let mut require = vec!["require", "--dev", "--ansi", "--no-progress", "--prefer-dist", "-v"];
        require.extend(reqs.iter().map(String::as_str));
        self.call(&ctx.in_dir(&vendor_dir, "composer", &require))?;

        if ctx.opts.packages_source == PackagesSource::Vendor {
            // merge core's autoload-dev into the vendor autoloader
            let include = mw_composer_json.display().to_string();
            self.call(&ctx.in_dir(
                &vendor_dir,
                "composer",
                &["config", "extra.merge-plugin.include", include.as_str()],
            ))?;
        }

        self.call(&ctx.in_dir(&vendor_dir, "composer", &["dump-autoload", "--optimize"]))?;

        self.copylog(ctx, &mw_composer_json, "composer.core.json.txt")?;
        self.copylog(ctx, &vendor_dir.join("composer.json"), "composer.vendor.json.txt")?;
        self.copylog(
            ctx,
            &vendor_dir.join("composer/autoload_files.php"),
            "composer.autoload_files.php.txt",
        )?;
        Ok(())
    }

    fn phpunit(&self, ctx: &RunState, kind: ProjectKind) -> ApplicationResult<()> {
        if kind.is_core_or_vendor() {
            info!("PHPUnit without Database group");
            let exclude = format!("{PHPUNIT_EXCLUDED},Database");
            let junit = ctx.junit("junit-dbless.xml");
            return self.call(&ctx.mw(
                "php",
                &[PHPUNIT, "--exclude-group", exclude.as_str(), junit.as_str()],
            ));
        }
        if !kind.is_ext_or_skin() {
            return Err(DomainError::UnrecognizedProject(ctx.zuul_project.clone()).into());
        }
        let testsuite = kind
            .phpunit_testsuite()
            .ok_or_else(|| DomainError::NoTestsuite(ctx.zuul_project.clone()))?;
        info!("PHPUnit {testsuite} testsuite");
        let junit = ctx.junit("junit.xml");
        self.call(&ctx.mw(
            "php",
            &[PHPUNIT, "--testsuite", testsuite, "--exclude-group", PHPUNIT_EXCLUDED, junit.as_str()],
        ))
    }

    fn qunit(&self, ctx: &RunState) -> ApplicationResult<()> {
        info!("QUnit");
        self.call(
            &ctx.mw("node_modules/.bin/grunt", &["karma:main"])
                .env("MW_SERVER", ctx.server())
                .env("MW_SCRIPT_PATH", ""),
        )
    }

    fn selenium(&self, ctx: &RunState) -> ApplicationResult<()> {
        // Xvfb only when the caller has no display of its own
        let (display, _xvfb) = match self.env.get("DISPLAY").filter(|d| !d.is_empty()) {
            Some(display) => (display.clone(), None),
            None => {
                info!("No DISPLAY, using Xvfb.");
                let display = ctx.opts.display.clone();
                let xvfb = self.backends.start_xvfb(&display)?;
                (display, Some(xvfb))
            }
        };
        let _driver = self.backends.start_chromedriver(&display)?;

        info!("Selenium");
        self.call(
            &ctx.mw("npm", &["run", "selenium-test"])
                .env("MW_SERVER", ctx.server())
                .env("MW_SCRIPT_PATH", "/")
                .env("DISPLAY", display.as_str()),
        )
    }
}

/// zuul-cloner map placing projects inside the MediaWiki checkout.
///
/// JSON is valid YAML, which zuul-cloner reads.
pub fn clone_map() -> Value {
    json!({
        "clonemap": [
            {"name": "mediawiki/core", "dest": "."},
            {"name": "mediawiki/vendor", "dest": "vendor"},
            {"name": "mediawiki/extensions/(.*)", "dest": "extensions/\\1"},
            {"name": "mediawiki/skins/(.*)", "dest": "skins/\\1"},
        ]
    })
}
