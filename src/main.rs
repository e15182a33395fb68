use std::error::Error;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use quibble::cli::output;
use quibble::cli::{execute_command, Cli};

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = execute_command(&cli) {
        output::error(&e);
        let mut source = e.source();
        while let Some(cause) = source {
            output::error(&format!("  caused by: {cause}"));
            source = cause.source();
        }
        std::process::exit(e.exit_code());
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    // Create a noisy module filter
    let noisy_modules = ["config", "mio"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    // Create a subscriber with formatted output directed to stderr
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .with_thread_names(false)
        .with_span_events(if verbosity >= 3 {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let filtered_layer = fmt_layer.with_filter(filter).with_filter(module_filter);

    tracing_subscriber::registry().with(filtered_layer).init();

    match filter {
        LevelFilter::INFO => tracing::info!("Debug mode: info"),
        LevelFilter::DEBUG => tracing::debug!("Debug mode: debug"),
        LevelFilter::TRACE => tracing::debug!("Debug mode: trace"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use quibble::cli::Commands;

    // https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing
    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_env_run_with_posargs_when_parsing_then_splits_at_double_dash() {
        let cli = Cli::parse_from(["quibble", "env", "run", "unit", "--", "-k", "foo"]);
        match cli.command {
            Some(Commands::Env {
                command: quibble::cli::args::EnvCommands::Run { names, posargs, ci },
            }) => {
                assert_eq!(names, vec!["unit".to_string()]);
                assert_eq!(posargs, vec!["-k".to_string(), "foo".to_string()]);
                assert!(!ci);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn given_names_and_ci_when_parsing_env_run_then_rejected() {
        let err = Cli::try_parse_from(["quibble", "env", "run", "lint", "--ci"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        assert!(Cli::try_parse_from(["quibble", "env", "run", "--ci"]).is_ok());
    }
}
