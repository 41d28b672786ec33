//! Disposable Postgres instances for integration tests, no Docker required.
//!
//! Suites call [`start_postgres`] and skip themselves when it fails, so the
//! database-backed tests degrade gracefully on machines without Postgres.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use postgres::NoTls;
use url::Url;

const ENV_URL: &str = "MASTHEAD_TEST_DATABASE_URL";
const READY_ATTEMPTS: u32 = 30;
const READY_POLL: Duration = Duration::from_millis(200);

/// Handle to a disposable Postgres database used in tests.
///
/// Dropping the handle removes the database and, when the helper spawned a
/// local server, stops it and deletes its data directory.
pub struct TestDatabase {
    connection_string: String,
    server: Option<LocalServer>,
    cleanup: Option<DbCleanup>,
}

impl TestDatabase {
    /// Connection string that can be passed to `sqlx` or other Postgres clients.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Some(cleanup) = &self.cleanup {
            let _ = drop_database(cleanup);
        }
        if let Some(server) = &mut self.server {
            let _ = server.process.kill();
            let _ = server.process.wait();
            let _ = fs::remove_dir_all(&server.data_dir);
        }
    }
}

struct LocalServer {
    process: Child,
    data_dir: PathBuf,
}

struct DbCleanup {
    admin_url: String,
    database: String,
}

/// Start a disposable Postgres database.
///
/// Prefers an externally supplied connection string via
/// `MASTHEAD_TEST_DATABASE_URL`, creating a uniquely named database on that
/// server. When unset, falls back to locally installed Postgres binaries
/// (`initdb`, `postgres`, `pg_isready`) and spawns a temporary instance.
///
/// # Errors
///
/// Returns an error if no external URL is provided and Postgres binaries are
/// unavailable or fail to start.
pub fn start_postgres() -> Result<TestDatabase> {
    if let Ok(url) = std::env::var(ENV_URL) {
        let created = create_unique_database(&url)?;
        return Ok(TestDatabase {
            connection_string: created.connection_string,
            server: None,
            cleanup: Some(created.cleanup),
        });
    }

    let initdb = resolve_binary("initdb")?;
    let postgres_bin = resolve_binary("postgres")?;
    let pg_isready = resolve_binary("pg_isready")?;

    let port = reserve_port()?;
    let data_dir = create_data_dir()?;
    let data_dir_str = data_dir
        .to_str()
        .context("data dir contains non-utf8 characters")?
        .to_string();

    let initdb_status = Command::new(initdb)
        .args(["-D", &data_dir_str, "--username=postgres", "--auth=trust"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .context("failed to run initdb")?;
    if !initdb_status.success() {
        bail!("initdb exited with failure status");
    }

    let process = Command::new(postgres_bin)
        .args(["-D", &data_dir_str, "-p", &port.to_string(), "-h", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to start postgres process")?;

    wait_for_ready(&pg_isready, port)?;

    let base_url = format!("postgres://postgres@127.0.0.1:{port}/postgres");
    let created = create_unique_database(&base_url)?;

    Ok(TestDatabase {
        connection_string: created.connection_string,
        server: Some(LocalServer { process, data_dir }),
        cleanup: Some(created.cleanup),
    })
}

fn resolve_binary(name: &str) -> Result<PathBuf> {
    // Full server installations first so `initdb` finds its assets.
    let mut search_paths: Vec<PathBuf> = vec![
        PathBuf::from("/opt/homebrew/opt/postgresql@16/bin"),
        PathBuf::from("/usr/local/opt/postgresql@16/bin"),
    ];
    search_paths.extend(
        std::env::var_os("PATH")
            .map_or_else(Vec::new, |paths| std::env::split_paths(&paths).collect()),
    );
    search_paths.push(PathBuf::from("/usr/local/bin"));
    search_paths.push(PathBuf::from("/opt/homebrew/bin"));

    search_paths
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.exists())
        .with_context(|| format!("{name} binary is required for Postgres tests"))
}

fn reserve_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    let port = listener
        .local_addr()
        .context("failed to read listener address")?
        .port();
    drop(listener);
    Ok(port)
}

fn create_data_dir() -> Result<PathBuf> {
    let base = PathBuf::from(".test_state/postgres");
    fs::create_dir_all(&base)
        .with_context(|| format!("failed to create base dir {}", base.display()))?;
    for attempt in 0..5 {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let candidate = base.join(format!("masthead-pg-{suffix}-{attempt}"));
        if !candidate.exists() {
            fs::create_dir_all(&candidate)
                .with_context(|| format!("failed to create data dir {}", candidate.display()))?;
            return Ok(candidate);
        }
    }
    bail!("failed to allocate temporary data directory for postgres");
}

fn wait_for_ready(pg_isready: &Path, port: u16) -> Result<()> {
    for _ in 0..READY_ATTEMPTS {
        let status = Command::new(pg_isready)
            .args(["-h", "127.0.0.1", "-p", &port.to_string(), "-U", "postgres"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if matches!(status, Ok(ref s) if s.success()) {
            return Ok(());
        }
        thread::sleep(READY_POLL);
    }

    bail!("postgres process did not become ready in time")
}

struct CreatedDatabase {
    connection_string: String,
    cleanup: DbCleanup,
}

fn create_unique_database(base_url: &str) -> Result<CreatedDatabase> {
    let parsed = Url::parse(base_url).context("invalid postgres connection url")?;
    let db_name = unique_database_name();

    let mut database_url = parsed.clone();
    database_url.set_path(&format!("/{db_name}"));

    let mut last_error: Option<anyhow::Error> = None;
    for admin_url in admin_urls(&parsed) {
        match run_admin_statement(&admin_url, &format!("CREATE DATABASE \"{db_name}\"")) {
            Ok(()) => {
                return Ok(CreatedDatabase {
                    connection_string: database_url.to_string(),
                    cleanup: DbCleanup {
                        admin_url,
                        database: db_name,
                    },
                });
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("failed to create database")))
}

fn admin_urls(base: &Url) -> Vec<String> {
    let mut admin = base.clone();
    admin.set_path("/postgres");
    let mut urls = vec![admin.to_string()];
    // Fall back to the provided database when `postgres` is not connectable.
    if admin.path() != base.path() {
        urls.push(base.to_string());
    }
    urls
}

fn drop_database(cleanup: &DbCleanup) -> Result<()> {
    run_admin_statement(
        &cleanup.admin_url,
        &format!("DROP DATABASE IF EXISTS \"{}\"", cleanup.database),
    )
}

// The blocking `postgres` client must not run on an async test runtime thread.
fn run_admin_statement(admin_url: &str, statement: &str) -> Result<()> {
    let admin = admin_url.to_string();
    let statement = statement.to_string();
    thread::spawn(move || -> Result<()> {
        let config = postgres::Config::from_str(&admin)?;
        let mut client = config.connect(NoTls)?;
        client
            .simple_query(&statement)
            .map(|_| ())
            .context("failed to run admin statement")
    })
    .join()
    .unwrap_or_else(|_| Err(anyhow::anyhow!("admin statement thread panicked")))?;
    Ok(())
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    format!("masthead_test_{pid}_{nanos}")
}
