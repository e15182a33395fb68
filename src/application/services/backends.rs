//! Background services of a MediaWiki run
//!
//! Database servers, the PHP built-in web server, Xvfb and chromedriver.
//! Each is held by a handle; dropping the handle stops the process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::application::exec::check_call;
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{CommandLine, DbConnection, DbEngine};
use crate::infrastructure::traits::{BackgroundProcess, CommandRunner, FileSystem, NetworkProbe};

pub const DB_NAME: &str = "wikidb";
pub const DB_USER: &str = "wikiuser";
pub const DB_PASSWORD: &str = "wikipassword";
const POLL: Duration = Duration::from_millis(100);

/// Poll `ready` until it holds or `timeout` elapses.
fn wait_until(name: &str, timeout: Duration, mut ready: impl FnMut() -> bool) -> ApplicationResult<()> {
    let start = Instant::now();
    loop {
        if ready() {
            debug!("{name} ready after {:?}", start.elapsed());
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(ApplicationError::ServiceNotReady {
                name: name.to_string(),
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL);
    }
}

/// A started database. Keeps its data directory alive until dropped.
pub struct Database {
    pub connection: DbConnection,
    // field order matters: the server stops before its datadir is removed
    process: Option<Box<dyn BackgroundProcess>>,
    _datadir: TempDir,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connection", &self.connection)
            .field("pid", &self.process.as_ref().and_then(|p| p.id()))
            .finish()
    }
}

/// Starts background services through the I/O boundary traits.
pub struct Backends {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CommandRunner>,
    probe: Arc<dyn NetworkProbe>,
    timeout: Duration,
}

impl Backends {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CommandRunner>,
        probe: Arc<dyn NetworkProbe>,
        timeout: Duration,
    ) -> Self {
        Self {
            fs,
            cmd,
            probe,
            timeout,
        }
    }

    fn spawn(&self, name: &str, cmd: &CommandLine) -> ApplicationResult<Box<dyn BackgroundProcess>> {
        info!("starting {name}: {cmd}");
        self.cmd
            .spawn(name, cmd)
            .map_err(|source| ApplicationError::Spawn {
                command: cmd.to_string(),
                source,
            })
    }

    fn wait_for_path(&self, name: &str, path: &Path) -> ApplicationResult<()> {
        wait_until(name, self.timeout, || self.fs.exists(path))
    }

    fn wait_for_port(&self, name: &str, host: &str, port: u16) -> ApplicationResult<()> {
        wait_until(name, self.timeout, || self.probe.is_listening(host, port))
    }

    /// Start a database server for `engine`.
    ///
    /// `user` is the system account mysqld runs as.
    pub fn start_database(&self, engine: DbEngine, user: &str) -> ApplicationResult<Database> {
        let datadir = tempfile::Builder::new()
            .prefix(&format!("quibble-{engine}-"))
            .tempdir()
            .map_err(|e| ApplicationError::OperationFailed {
                context: "create database directory".to_string(),
                source: Box::new(e),
            })?;
        let dir = datadir.path().to_path_buf();
        info!("starting {engine} database in {}", dir.display());

        let (connection, process) = match engine {
            DbEngine::Sqlite => (self.sqlite(&dir), None),
            DbEngine::Mysql => {
                let (c, p) = self.mysql(&dir, user)?;
                (c, Some(p))
            }
            DbEngine::Postgres => {
                let (c, p) = self.postgres(&dir)?;
                (c, Some(p))
            }
        };

        Ok(Database {
            connection,
            process,
            _datadir: datadir,
        })
    }

    fn sqlite(&self, dir: &Path) -> DbConnection {
        DbConnection {
            engine: DbEngine::Sqlite,
            dbname: DB_NAME.to_string(),
            user: String::new(),
            password: String::new(),
            dbserver: String::new(),
            datadir: dir.display().to_string(),
        }
    }

    fn mysql(&self, dir: &Path, user: &str) -> ApplicationResult<(DbConnection, Box<dyn BackgroundProcess>)> {
        let datadir = dir.display().to_string();
        let socket = dir.join("socket");
        let socket_str = socket.display().to_string();

        check_call(
            self.cmd.as_ref(),
            &CommandLine::new(
                "mysql_install_db",
                [format!("--datadir={datadir}"), format!("--user={user}")],
            ),
        )?;

        let server = self.spawn(
            "mysqld",
            &CommandLine::new(
                "mysqld",
                [
                    "--skip-networking".to_string(),
                    format!("--datadir={datadir}"),
                    format!("--log-error={datadir}/error.log"),
                    format!("--pid-file={datadir}/mysqld.pid"),
                    format!("--socket={socket_str}"),
                ],
            ),
        )?;
        self.wait_for_path("mysqld", &socket)?;

        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {DB_NAME}; \
             CREATE USER '{DB_USER}'@'localhost' IDENTIFIED BY '{DB_PASSWORD}'; \
             GRANT ALL ON {DB_NAME}.* TO '{DB_USER}'@'localhost';"
        );
        check_call(
            self.cmd.as_ref(),
            &CommandLine::new(
                "mysql",
                ["--user=root".to_string(), format!("--socket={socket_str}"), "-e".to_string(), sql],
            ),
        )?;

        Ok((
            DbConnection {
                engine: DbEngine::Mysql,
                dbname: DB_NAME.to_string(),
                user: DB_USER.to_string(),
                password: DB_PASSWORD.to_string(),
                dbserver: format!("localhost:{socket_str}"),
                datadir,
            },
            server,
        ))
    }

    fn postgres(&self, dir: &Path) -> ApplicationResult<(DbConnection, Box<dyn BackgroundProcess>)> {
        let datadir = dir.join("data");
        let data_str = datadir.display().to_string();
        let socket_dir = dir.display().to_string();

        check_call(
            self.cmd.as_ref(),
            &CommandLine::new("initdb", ["-D", data_str.as_str(), "-U", "postgres"]),
        )?;
        let server = self.spawn(
            "postgres",
            &CommandLine::new(
                "postgres",
                ["-D", data_str.as_str(), "-k", socket_dir.as_str(), "-c", "listen_addresses="],
            ),
        )?;
        self.wait_for_path("postgres", &dir.join(".s.PGSQL.5432"))?;

        let psql = |sql: String| {
            CommandLine::new(
                "psql",
                ["-h".to_string(), socket_dir.clone(), "-U".to_string(), "postgres".to_string(), "-c".to_string(), sql],
            )
        };
        check_call(
            self.cmd.as_ref(),
            &psql(format!("CREATE USER {DB_USER} WITH PASSWORD '{DB_PASSWORD}';")),
        )?;
        check_call(
            self.cmd.as_ref(),
            &psql(format!("CREATE DATABASE {DB_NAME} OWNER {DB_USER};")),
        )?;

        Ok((
            DbConnection {
                engine: DbEngine::Postgres,
                dbname: DB_NAME.to_string(),
                user: DB_USER.to_string(),
                password: DB_PASSWORD.to_string(),
                dbserver: socket_dir.clone(),
                datadir: data_str,
            },
            server,
        ))
    }

    /// PHP built-in web server serving `mwdir`.
    pub fn start_web_server(
        &self,
        mwdir: &Path,
        port: u16,
        env: &BTreeMap<String, String>,
    ) -> ApplicationResult<Box<dyn BackgroundProcess>> {
        let server = self.spawn(
            "php web server",
            &CommandLine::new(
                "php",
                [
                    "-S".to_string(),
                    format!("127.0.0.1:{port}"),
                    "-t".to_string(),
                    mwdir.display().to_string(),
                ],
            )
            .current_dir(mwdir)
            .envs(env),
        )?;
        self.wait_for_port("php web server", "127.0.0.1", port)?;
        Ok(server)
    }

    /// Virtual X server on `display`.
    pub fn start_xvfb(&self, display: &str) -> ApplicationResult<Box<dyn BackgroundProcess>> {
        let xvfb = self.spawn(
            "Xvfb",
            &CommandLine::new(
                "Xvfb",
                [display, "-screen", "0", "1280x1024x24", "-ac", "-nolisten", "tcp"],
            ),
        )?;
        let number = display.trim_start_matches(':');
        let lock = PathBuf::from(format!("/tmp/.X{number}-lock"));
        self.wait_for_path("Xvfb", &lock)?;
        Ok(xvfb)
    }

    /// chromedriver on port 4444 drawing on `display`.
    pub fn start_chromedriver(&self, display: &str) -> ApplicationResult<Box<dyn BackgroundProcess>> {
        let driver = self.spawn(
            "chromedriver",
            &CommandLine::new("chromedriver", ["--port=4444", "--url-base=/wd/hub"])
                .env("DISPLAY", display),
        )?;
        self.wait_for_port("chromedriver", "127.0.0.1", 4444)?;
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_ready_condition_when_waiting_then_returns_immediately() {
        assert!(wait_until("svc", Duration::from_secs(1), || true).is_ok());
    }

    #[test]
    fn given_never_ready_when_waiting_then_times_out() {
        let err = wait_until("svc", Duration::from_millis(150), || false).unwrap_err();
        assert!(matches!(err, ApplicationError::ServiceNotReady { ref name, .. } if name == "svc"));
    }
}
