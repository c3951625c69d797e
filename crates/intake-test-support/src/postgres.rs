//! Disposable Postgres databases for integration tests.
//!
//! An external server named by `INTAKE_TEST_DATABASE_URL` is preferred; a
//! throwaway cluster is spawned from local server binaries otherwise.

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use postgres::NoTls;
use tempfile::TempDir;
use url::Url;

/// Environment variable naming an existing server to create test databases on.
pub const TEST_DATABASE_URL_ENV: &str = "INTAKE_TEST_DATABASE_URL";

const CONNECT_ATTEMPTS: usize = 50;
const CONNECT_BACKOFF: Duration = Duration::from_millis(200);

/// A uniquely named database, dropped (and its cluster stopped) on `Drop`.
pub struct TestDatabase {
    connection_string: String,
    admin: AdminTarget,
    cluster: Option<LocalCluster>,
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
        let _ = self.admin.drop_database();
        // Dropping the cluster stops the server, then removes its data dir.
        self.cluster.take();
    }
}

/// Start a disposable Postgres database.
///
/// Callers skip their test when this returns an error.
///
/// # Errors
///
/// Returns an error if no external URL is provided and the server binaries
/// are unavailable or fail to start.
pub fn start_postgres() -> Result<TestDatabase> {
    match std::env::var(TEST_DATABASE_URL_ENV) {
        Ok(url) => provision(&url, None),
        Err(_) => {
            let cluster = LocalCluster::start()?;
            let url = cluster.url();
            provision(&url, Some(cluster))
        }
    }
}

fn provision(server_url: &str, cluster: Option<LocalCluster>) -> Result<TestDatabase> {
    let server = Url::parse(server_url).context("invalid postgres connection url")?;
    let database = unique_database_name();
    let admin = AdminTarget::create(&server, database.clone())?;

    let mut target = server;
    target.set_path(&format!("/{database}"));
    Ok(TestDatabase {
        connection_string: target.to_string(),
        admin,
        cluster,
    })
}

/// Maintenance connection used to create and later drop one database.
struct AdminTarget {
    url: String,
    database: String,
}

impl AdminTarget {
    /// Create `database`, trying the `postgres` maintenance database first and
    /// the supplied one second.
    fn create(server: &Url, database: String) -> Result<Self> {
        let mut last_error = anyhow!("no admin database to connect to");
        for url in admin_urls(server) {
            match execute(&url, format!("CREATE DATABASE \"{database}\"")) {
                Ok(()) => return Ok(Self { url, database }),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    fn drop_database(&self) -> Result<()> {
        execute(
            &self.url,
            format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.database),
        )
    }
}

fn admin_urls(server: &Url) -> Vec<String> {
    let mut maintenance = server.clone();
    maintenance.set_path("/postgres");
    let mut urls = vec![maintenance.to_string()];
    if maintenance.path() != server.path() {
        urls.push(server.to_string());
    }
    urls
}

/// A private server process and the temporary directory backing it.
struct LocalCluster {
    process: Child,
    port: u16,
    _data_dir: TempDir,
}

impl LocalCluster {
    fn start() -> Result<Self> {
        let initdb = locate_binary("initdb")?;
        let server = locate_binary("postgres")?;
        let data_dir = tempfile::Builder::new()
            .prefix("intake-postgres-")
            .tempdir()
            .context("failed to create cluster directory")?;

        let initialised = Command::new(initdb)
            .arg("-D")
            .arg(data_dir.path())
            .args(["--username=postgres", "--auth=trust"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .context("failed to run initdb")?;
        if !initialised.success() {
            bail!("initdb exited with {initialised}");
        }

        let port = free_port()?;
        let process = Command::new(server)
            .arg("-D")
            .arg(data_dir.path())
            .args(["-h", "127.0.0.1", "-p", &port.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to start postgres")?;
        let cluster = Self {
            process,
            port,
            _data_dir: data_dir,
        };
        cluster.wait_until_accepting()?;
        Ok(cluster)
    }

    fn url(&self) -> String {
        format!("postgres://postgres@127.0.0.1:{}/postgres", self.port)
    }

    fn wait_until_accepting(&self) -> Result<()> {
        let url = self.url();
        for _ in 0..CONNECT_ATTEMPTS {
            if execute(&url, "SELECT 1".to_string()).is_ok() {
                return Ok(());
            }
            thread::sleep(CONNECT_BACKOFF);
        }
        bail!("postgres on port {} never accepted connections", self.port)
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Server binaries are looked up in Debian's versioned directories (newest
/// first), then on `PATH`.
fn locate_binary(name: &str) -> Result<PathBuf> {
    let mut versioned: Vec<PathBuf> = std::fs::read_dir("/usr/lib/postgresql")
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|entry| entry.path().join("bin"))
                .collect()
        })
        .unwrap_or_default();
    versioned.sort_unstable_by(|left, right| right.cmp(left));
    let on_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();

    versioned
        .into_iter()
        .chain(on_path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .with_context(|| format!("{name} not found; set {TEST_DATABASE_URL_ENV} instead"))
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("failed to reserve port")?;
    Ok(listener.local_addr()?.port())
}

// The blocking client drives its own runtime, so it must stay off tokio
// worker threads.
fn execute(url: &str, statement: String) -> Result<()> {
    let url = url.to_string();
    thread::spawn(move || -> Result<()> {
        let mut client = postgres::Client::connect(&url, NoTls)?;
        client
            .batch_execute(&statement)
            .with_context(|| format!("failed to run `{statement}`"))
    })
    .join()
    .map_err(|_| anyhow!("postgres admin thread panicked"))?
}

fn unique_database_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("intake_test_{}_{nanos}", std::process::id())
}
