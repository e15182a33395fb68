//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::{DbEngine, PackagesSource};

/// MediaWiki CI test runner: image provisioning, test environments and full test runs
#[derive(Parser, Debug)]
#[command(name = "quibble")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Project directory holding .quibble.toml (default: cwd)
    #[arg(short = 'C', long, global = true, value_hint = ValueHint::DirPath)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone, install and test MediaWiki
    Run(RunArgs),

    /// Install packages, seed bare repositories and start services
    Provision {
        /// Print the steps without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run isolated test environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Source of PHP dependencies: composer or vendor
    #[arg(long, default_value = "vendor")]
    pub packages_source: PackagesSource,

    /// Do not clone or update repositories
    #[arg(long)]
    pub skip_zuul: bool,

    /// Do not install composer and npm dependencies
    #[arg(long)]
    pub skip_deps: bool,

    /// Database backend: sqlite, mysql or postgres
    #[arg(long, default_value = "mysql")]
    pub db: DbEngine,

    /// Bare repositories to clone from (default: /srv/git in Docker, else ref)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub git_cache: Option<PathBuf>,

    /// Base path to work from (default: /workspace in Docker, else cwd)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub workspace: Option<PathBuf>,

    /// Where logs and artifacts go, relative to the workspace (default: /log in Docker, else log)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub log_dir: Option<PathBuf>,

    /// Additional repositories to clone
    pub projects: Vec<String>,

    /// Stages to run: phpunit, npm-test, composer-test, qunit, selenium or all
    #[arg(long, num_args = 0.., default_value = "all")]
    pub run: Vec<String>,

    /// Stages to skip; all skips every stage
    #[arg(long, num_args = 0..)]
    pub skip: Vec<String>,

    /// Commands run in the MediaWiki directory instead of the test stages
    #[arg(short, long, num_args = 1..)]
    pub commands: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// List environments and the env lists including them
    List,

    /// Run environments in order (default: the list for the current context)
    Run {
        /// Environment names
        names: Vec<String>,
        /// Use the CI env list; only valid without names
        #[arg(long, conflicts_with = "names")]
        ci: bool,
        /// Arguments replacing {posargs}
        #[arg(last = true)]
        posargs: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
