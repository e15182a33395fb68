//! Test support: logging setup and fakes for the I/O boundary traits

use std::env;
use std::io;
use std::sync::{Arc, Mutex, Once};

use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::domain::CommandLine;
use crate::infrastructure::traits::{
    BackgroundProcess, CommandRunner, CommandStatus, NetworkProbe,
};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    let noisy_modules = ["config"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else if let Err(e) = subscriber.try_init() {
        if env::var("RUST_LOG").is_ok() {
            eprintln!("Error: Failed to set up logging: {}", e);
        }
    }
}

/// What the fake runner saw, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run(CommandLine),
    Spawn(String, CommandLine),
}

impl Invocation {
    pub fn command(&self) -> &CommandLine {
        match self {
            Invocation::Run(c) | Invocation::Spawn(_, c) => c,
        }
    }
}

/// Command runner recording every command instead of running it.
///
/// Commands whose rendered line contains a registered pattern exit with the
/// registered code; everything else succeeds.
#[derive(Debug, Default, Clone)]
pub struct FakeCommandRunner {
    calls: Arc<Mutex<Vec<Invocation>>>,
    failures: Arc<Mutex<Vec<(String, CommandStatus)>>>,
    stopped: Arc<Mutex<Vec<String>>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` exit with `code`.
    pub fn fail_when(self, pattern: &str, code: i32) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pattern.to_string(), CommandStatus::exited(code)));
        self
    }

    /// Commands containing `pattern` are killed by a signal.
    pub fn kill_when(self, pattern: &str) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pattern.to_string(), CommandStatus { code: None }));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Rendered command lines, in call order.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command().to_string()).collect()
    }

    /// Names of background processes stopped so far, in stop order.
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: Invocation) -> CommandStatus {
        let line = call.command().to_string();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, status)| *status)
            .unwrap_or(CommandStatus::exited(0))
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandStatus> {
        Ok(self.record(Invocation::Run(cmd.clone())))
    }

    fn spawn(&self, name: &str, cmd: &CommandLine) -> io::Result<Box<dyn BackgroundProcess>> {
        self.record(Invocation::Spawn(name.to_string(), cmd.clone()));
        Ok(Box::new(FakeProcess {
            name: name.to_string(),
            stopped: self.stopped.clone(),
            running: true,
        }))
    }
}

/// Background process handle reporting its stop to the runner.
#[derive(Debug)]
pub struct FakeProcess {
    name: String,
    stopped: Arc<Mutex<Vec<String>>>,
    running: bool,
}

impl BackgroundProcess for FakeProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<u32> {
        None
    }

    fn stop(&mut self) -> io::Result<()> {
        if self.running {
            self.running = false;
            self.stopped
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(self.name.clone());
        }
        Ok(())
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Probe answering every port as listening.
#[derive(Debug, Default)]
pub struct AlwaysListening;

impl NetworkProbe for AlwaysListening {
    fn is_listening(&self, _host: &str, _port: u16) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_setup() {
        init_test_setup();
    }

    #[test]
    fn given_failure_pattern_when_running_then_returns_registered_code() {
        let runner = FakeCommandRunner::new().fail_when("flake8", 2);
        let status = runner
            .run(&CommandLine::new("flake8", ["quibble"]))
            .unwrap();
        assert_eq!(status.code, Some(2));
        assert!(runner.run(&CommandLine::new("true", Vec::<String>::new())).unwrap().success());
        assert_eq!(runner.lines(), vec!["flake8 quibble", "true"]);
    }

    #[test]
    fn given_spawned_process_when_dropped_then_recorded_as_stopped() {
        let runner = FakeCommandRunner::new();
        let handle = runner.spawn("web", &CommandLine::new("php", ["-S"])).unwrap();
        assert!(runner.stopped().is_empty());
        drop(handle);
        assert_eq!(runner.stopped(), vec!["web".to_string()]);
    }
}
