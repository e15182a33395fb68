//! I/O boundary traits for testability
//!
//! These traits abstract external I/O operations, allowing services
//! to be tested with fake implementations.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::{debug, warn};

use crate::domain::CommandLine;

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read file contents to string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write string content to file.
    fn write(&self, path: &Path, content: &str) -> io::Result<()>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Check if path is a directory with at least one entry.
    fn is_non_empty_dir(&self, path: &Path) -> bool;

    /// Create directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy file from source to destination.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Files named `name` below `root`, at most `max_depth` levels deep, sorted.
    fn find_named(&self, root: &Path, name: &str, max_depth: usize) -> Vec<PathBuf>;
}

/// Exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for CommandStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Long-running helper process (database, web server, display, ...).
///
/// Implementations stop the process when dropped.
pub trait BackgroundProcess: Send {
    fn name(&self) -> &str;

    fn id(&self) -> Option<u32>;

    /// Stop the process and wait for it.
    fn stop(&mut self) -> io::Result<()>;
}

/// External command runner abstraction.
pub trait CommandRunner: Send + Sync {
    /// Run to completion with inherited stdio.
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandStatus>;

    /// Start without waiting.
    fn spawn(&self, name: &str, cmd: &CommandLine) -> io::Result<Box<dyn BackgroundProcess>>;
}

/// Readiness checks for network services.
pub trait NetworkProbe: Send + Sync {
    /// Whether something accepts TCP connections on `host:port`.
    fn is_listening(&self, host: &str, port: u16) -> bool;
}

// ============================================================
// REAL IMPLEMENTATIONS
// ============================================================

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_non_empty_dir(&self, path: &Path) -> bool {
        std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn find_named(&self, root: &Path, name: &str, max_depth: usize) -> Vec<PathBuf> {
        use walkdir::WalkDir;

        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() == name)
            .map(|e| e.into_path())
            .collect();
        found.sort();
        found
    }
}

/// Real command runner implementation.
#[derive(Debug, Default)]
pub struct RealCommandRunner;

fn build(cmd: &CommandLine) -> Command {
    let mut command = Command::new(&cmd.program);
    command.args(&cmd.args).envs(&cmd.env);
    if let Some(dir) = &cmd.cwd {
        command.current_dir(dir);
    }
    command
}

impl CommandRunner for RealCommandRunner {
    fn run(&self, cmd: &CommandLine) -> io::Result<CommandStatus> {
        debug!("run: {cmd}");
        build(cmd).status().map(CommandStatus::from)
    }

    fn spawn(&self, name: &str, cmd: &CommandLine) -> io::Result<Box<dyn BackgroundProcess>> {
        debug!("spawn {name}: {cmd}");
        let child = build(cmd).stdin(Stdio::null()).spawn()?;
        Ok(Box::new(ChildProcess {
            name: name.to_string(),
            child: Some(child),
        }))
    }
}

/// Child process killed and reaped on drop.
#[derive(Debug)]
pub struct ChildProcess {
    name: String,
    child: Option<Child>,
}

impl BackgroundProcess for ChildProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn stop(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        debug!("stopping {} (pid {})", self.name, child.id());
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        child.wait().map(|_| ())
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop {}: {}", self.name(), e);
        }
    }
}

/// Real probe connecting over TCP.
#[derive(Debug, Default)]
pub struct TcpProbe;

impl NetworkProbe for TcpProbe {
    fn is_listening(&self, host: &str, port: u16) -> bool {
        use std::net::{TcpStream, ToSocketAddrs};
        use std::time::Duration;

        let Ok(mut addrs) = (host, port).to_socket_addrs() else {
            return false;
        };
        addrs.any(|addr| TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok())
    }
}
