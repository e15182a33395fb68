//! Command dispatch: resolves arguments and settings, then calls services

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use tracing::{debug, instrument};

use crate::application::services::RunOptions;
use crate::cli::args::{Cli, Commands, ConfigCommands, EnvCommands, RunArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{self, Settings};
use crate::domain::{EnvironmentSet, RunContext, StageSelection};
use crate::infrastructure::{InfraError, ServiceContainer};

/// Load settings, wire real services and run the selected command.
pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        let mut cmd = Cli::command();
        cmd.print_help()
            .map_err(|e| InfraError::io("print help", e))?;
        return Ok(());
    };
    if let Commands::Completion { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "quibble", &mut io::stdout());
        return Ok(());
    }

    let project_dir = project_dir(cli)?;
    let settings = Settings::load(Some(&project_dir))?;
    let container = ServiceContainer::new(settings);
    dispatch(command, &project_dir, config::is_in_docker(), &container)
}

fn project_dir(cli: &Cli) -> CliResult<PathBuf> {
    match &cli.project_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()
            .map_err(|e| InfraError::io("get current directory", e))?),
    }
}

/// Run `command` against an already wired container.
pub fn dispatch(
    command: &Commands,
    project_dir: &Path,
    in_docker: bool,
    container: &ServiceContainer,
) -> CliResult<()> {
    match command {
        Commands::Run(args) => cmd_run(args, in_docker, container),
        Commands::Provision { dry_run } => cmd_provision(*dry_run, container),
        Commands::Env { command } => match command {
            EnvCommands::List => cmd_env_list(container),
            EnvCommands::Run { names, ci, posargs } => {
                cmd_env_run(names, *ci, posargs, project_dir, container)
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd_config_show(container),
            ConfigCommands::Path => cmd_config_path(project_dir, container),
            ConfigCommands::Init { global } => cmd_config_init(*global, project_dir, container),
        },
        Commands::Completion { .. } => Err(CliError::Usage(
            "completion is handled before settings are loaded".to_string(),
        )),
    }
}

/// Resolve run arguments against settings and Docker defaults.
pub fn run_options(
    args: &RunArgs,
    settings: &Settings,
    in_docker: bool,
    cwd: &Path,
) -> CliResult<RunOptions> {
    let stages = StageSelection::new(args.run.clone(), args.skip.clone(), !args.commands.is_empty())?;
    let workspace = match &args.workspace {
        Some(dir) => dir.clone(),
        None if in_docker => PathBuf::from("/workspace"),
        None => cwd.to_path_buf(),
    };
    Ok(RunOptions {
        packages_source: args.packages_source,
        skip_zuul: args.skip_zuul,
        skip_deps: args.skip_deps,
        db: args.db,
        git_cache: args
            .git_cache
            .clone()
            .unwrap_or_else(|| settings.git_cache_or_default(in_docker)),
        workspace,
        log_dir: args
            .log_dir
            .clone()
            .unwrap_or_else(|| settings.log_dir_or_default(in_docker)),
        projects: args.projects.clone(),
        stages,
        commands: args.commands.clone(),
        in_docker,
        http_port: settings.http_port,
        display: settings.display.clone(),
        gerrit_url: settings.gerrit_url.clone(),
    })
}

#[instrument(skip(args, container))]
fn cmd_run(args: &RunArgs, in_docker: bool, container: &ServiceContainer) -> CliResult<()> {
    let cwd = std::env::current_dir().map_err(|e| InfraError::io("get current directory", e))?;
    let opts = run_options(args, &container.settings, in_docker, &cwd)?;
    debug!("run options: {opts:?}");
    container.mediawiki_service().execute(&opts)?;
    output::success("Done.");
    Ok(())
}

fn cmd_provision(dry_run: bool, container: &ServiceContainer) -> CliResult<()> {
    let plan = &container.settings.provision;
    if dry_run {
        output::header("Provisioning steps:");
        for (i, step) in plan.steps().iter().enumerate() {
            output::step(i + 1, &format!("{step}: {}", step.command()));
        }
        return Ok(());
    }

    let done = container.provision_service().run(plan)?;
    for step in &done {
        output::success_detail(step);
    }
    output::success(&format!("Provisioned {} step(s)", done.len()));
    Ok(())
}

fn cmd_env_list(container: &ServiceContainer) -> CliResult<()> {
    let set = container.settings.environment_set();
    set.validate()?;
    for line in env_list_lines(&set) {
        output::info(&line);
    }
    Ok(())
}

/// One line per environment, tagged with the env lists including it.
pub fn env_list_lines(set: &EnvironmentSet) -> Vec<String> {
    set.environments
        .iter()
        .map(|(name, env)| {
            let lists = set.lists_containing(name);
            let marker = if lists.is_empty() {
                String::new()
            } else {
                format!(" [{}]", lists.join(", "))
            };
            match &env.description {
                Some(description) => format!("{name}{marker}: {description}"),
                None => format!("{name}{marker}"),
            }
        })
        .collect()
}

#[instrument(skip(container))]
fn cmd_env_run(
    names: &[String],
    ci: bool,
    posargs: &[String],
    project_dir: &Path,
    container: &ServiceContainer,
) -> CliResult<()> {
    let set = container.settings.environment_set();
    let names = if names.is_empty() {
        let context = RunContext::detect(ci, &container.env);
        debug!("no environments given, using {context:?} list");
        set.select(context).to_vec()
    } else {
        names.to_vec()
    };
    if names.is_empty() {
        return Err(CliError::Usage("no environments to run".to_string()));
    }

    let path = container.env.get("PATH").map(String::as_str);
    let passed = container
        .orchestrator_service()
        .run(&set, &names, project_dir, posargs, path)?;
    for name in &passed {
        output::success_detail(name);
    }
    output::success(&format!("{} environment(s) passed", passed.len()));
    Ok(())
}

fn cmd_config_show(container: &ServiceContainer) -> CliResult<()> {
    output::info(&container.settings.to_toml()?);
    Ok(())
}

fn cmd_config_path(project_dir: &Path, container: &ServiceContainer) -> CliResult<()> {
    let status = |path: &Path| {
        if container.fs.exists(path) {
            "exists"
        } else {
            "not found"
        }
    };
    match config::global_config_path() {
        Some(path) => output::action("Global", &format!("{} ({})", path.display(), status(&path))),
        None => output::action("Global", &"unavailable"),
    }
    let local = config::local_config_path(project_dir);
    output::action("Local", &format!("{} ({})", local.display(), status(&local)));
    Ok(())
}

fn cmd_config_init(global: bool, project_dir: &Path, container: &ServiceContainer) -> CliResult<()> {
    let path = if global {
        config::global_config_path()
            .ok_or_else(|| CliError::Usage("cannot determine global config directory".to_string()))?
    } else {
        config::local_config_path(project_dir)
    };
    if container.fs.exists(&path) {
        return Err(CliError::Usage(format!(
            "config already exists: {}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        container
            .fs
            .create_dir_all(parent)
            .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
    }
    container
        .fs
        .write(&path, &Settings::template())
        .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
    output::action("Created", &path.display());
    Ok(())
}
