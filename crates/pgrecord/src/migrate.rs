//! Sequential migration runner with a ledger table.
//!
//! Migrations are plain files in one directory, named
//! `<YYYY-MM-DDTHHMMSS>_<name>.<ext>` so that lexicographic order is
//! creation order. The `migrations` table records the file name of every
//! migration that finished; [`run`] applies the rest one at a time and stops
//! at the first failure, leaving earlier ledger rows in place.
//!
//! # Example
//!
//! ```ignore
//! use pgrecord::{create_pool, migrate};
//!
//! let pool = create_pool(&std::env::var("DATABASE_URL")?)?;
//! migrate::init(&pool, "migrations").await?;
//! let runner = migrate::ProcessRunner::new()
//!     .interpreter("sh", "sh")
//!     .env("DATABASE_URL", std::env::var("DATABASE_URL")?);
//! let report = migrate::run_pool(&pool, "migrations", &runner).await?;
//! println!("applied {} migration(s)", report.len());
//! ```

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::execute;
use crate::model::Model;
use crate::naming;
use crate::row::RowExt;
use crate::statement::in_list_placeholders;
use crate::value::{ColumnType, Value};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Ledger model. Its table is `migrations(id serial primary key, file_name text)`.
pub struct SchemaMigration;

impl Model for SchemaMigration {
    const NAME: &'static str = "Migration";

    fn columns() -> Vec<(&'static str, ColumnType)> {
        vec![("file_name", ColumnType::String)]
    }
}

/// Create the ledger table and the migrations directory if missing.
pub async fn init(conn: &impl GenericClient, dir: impl AsRef<Path>) -> OrmResult<()> {
    SchemaMigration::create_table(conn).await?;
    fs::create_dir_all(dir.as_ref())?;
    Ok(())
}

/// Migration file names in `dir`, sorted. Hidden files and subdirectories
/// are skipped.
pub fn local_migrations(dir: impl AsRef<Path>) -> OrmResult<Vec<String>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        OrmError::Other(format!(
            "failed to read migrations dir {}: {e}",
            dir.display()
        ))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Which of `names` already have a ledger row.
pub async fn applied(conn: &impl GenericClient, names: &[String]) -> OrmResult<Vec<String>> {
    let table = SchemaMigration::table_name();
    let sql = format!(
        "SELECT {table}.file_name FROM {table} WHERE {table}.file_name IN ({})",
        in_list_placeholders(names.len(), 1)
    );
    let values: Vec<Value> = names.iter().map(Value::from).collect();
    let rows = execute::execute_rows(conn, &sql, &values).await?;
    rows.iter().map(|row| row.try_get_column("file_name")).collect()
}

/// Local migrations without a ledger row, in run order.
pub async fn pending(conn: &impl GenericClient, dir: impl AsRef<Path>) -> OrmResult<Vec<String>> {
    Ok(status(conn, dir).await?.pending)
}

/// Local, applied and pending migration names for a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    pub local: Vec<String>,
    pub applied: Vec<String>,
    pub pending: Vec<String>,
}

pub async fn status(conn: &impl GenericClient, dir: impl AsRef<Path>) -> OrmResult<MigrationStatus> {
    let local = local_migrations(dir)?;
    let applied = applied(conn, &local).await?;
    let done: HashSet<&str> = applied.iter().map(String::as_str).collect();
    let pending = local
        .iter()
        .filter(|name| !done.contains(name.as_str()))
        .cloned()
        .collect();
    Ok(MigrationStatus {
        local,
        applied,
        pending,
    })
}

/// One migration applied by [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub file_name: String,
    /// Captured standard output of the script.
    pub output: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<AppliedMigration>,
}

impl MigrationReport {
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.applied.iter().map(|m| m.file_name.as_str()).collect()
    }
}

/// Executes one migration file.
pub trait ScriptRunner: Send + Sync {
    /// Run the script at `path` to completion and return its output.
    fn run_script(
        &self,
        conn: &impl GenericClient,
        path: &Path,
    ) -> impl Future<Output = OrmResult<String>> + Send;
}

/// Runs `.sql` files as a batch on the connection and every other file as a
/// child process.
///
/// A file whose extension has a registered interpreter runs as
/// `<interpreter> <path>`; anything else is executed directly.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    interpreters: HashMap<String, String>,
    envs: Vec<(String, String)>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run files ending in `.<extension>` with `command`, e.g. `("js", "node")`.
    /// The command may carry arguments: `"bash -e"`.
    pub fn interpreter(mut self, extension: impl Into<String>, command: impl Into<String>) -> Self {
        let extension = extension.into();
        self.interpreters
            .insert(extension.trim_start_matches('.').to_string(), command.into());
        self
    }

    /// Extra environment variable for child processes.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self, path: &Path) -> OrmResult<tokio::process::Command> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut command = match self.interpreters.get(extension) {
            Some(interpreter) => {
                let mut parts = interpreter.split_whitespace();
                let program = parts.next().ok_or_else(|| {
                    OrmError::validation(format!("empty interpreter for .{extension} files"))
                })?;
                let mut command = tokio::process::Command::new(program);
                command.args(parts).arg(path);
                command
            }
            None => tokio::process::Command::new(path),
        };
        command.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(command)
    }
}

impl ScriptRunner for ProcessRunner {
    async fn run_script(&self, conn: &impl GenericClient, path: &Path) -> OrmResult<String> {
        if path.extension().is_some_and(|e| e == "sql") {
            let sql = tokio::fs::read_to_string(path).await?;
            conn.batch_execute(&sql).await?;
            return Ok(String::new());
        }

        let output = self.command(path)?.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrmError::Other(format!(
                "{} ({})",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Apply every pending migration in `dir`, one at a time.
///
/// Each migration's ledger row is written right after its script finishes,
/// before the next one starts. The first failure aborts the run with
/// [`OrmError::Migration`]; nothing after it is attempted.
pub async fn run(
    conn: &impl GenericClient,
    dir: impl AsRef<Path>,
    runner: &impl ScriptRunner,
) -> OrmResult<MigrationReport> {
    let dir = dir.as_ref();
    let pending = pending(conn, dir).await?;
    if pending.is_empty() {
        tracing::info!(target: "pgrecord.migrate", "no pending migrations");
    }

    let mut report = MigrationReport::default();
    for file_name in pending {
        tracing::info!(target: "pgrecord.migrate", file = %file_name, "starting migration");
        let started = Instant::now();

        let output = runner
            .run_script(conn, &dir.join(&file_name))
            .await
            .map_err(|e| OrmError::migration(&file_name, e.to_string()))?;
        let elapsed = started.elapsed();
        if !output.trim().is_empty() {
            tracing::info!(target: "pgrecord.migrate", file = %file_name, output = %output.trim_end());
        }

        record_applied(conn, &file_name)
            .await
            .map_err(|e| OrmError::migration(&file_name, format!("recording ledger row: {e}")))?;
        tracing::info!(
            target: "pgrecord.migrate",
            file = %file_name,
            elapsed_ms = elapsed.as_millis() as u64,
            "migration done",
        );

        report.applied.push(AppliedMigration {
            file_name,
            output,
            elapsed,
        });
    }
    Ok(report)
}

async fn record_applied(conn: &impl GenericClient, file_name: &str) -> OrmResult<()> {
    let sql = format!(
        "INSERT INTO {} (file_name) VALUES ($1)",
        SchemaMigration::table_name()
    );
    execute::execute_command(conn, &sql, &[Value::from(file_name)]).await?;
    Ok(())
}

/// [`run`] on a single connection checked out from `pool` for the whole run.
#[cfg(feature = "pool")]
pub async fn run_pool(
    pool: &deadpool_postgres::Pool,
    dir: impl AsRef<Path>,
    runner: &impl ScriptRunner,
) -> OrmResult<MigrationReport> {
    let client = pool.get().await?;
    run(&client, dir, runner).await
}

/// `2024-05-01T120304_add_users.sql` for `("AddUsers", "sql", 2024-05-01 12:03:04)`.
pub fn migration_file_name(name: &str, extension: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{}",
        now.format("%Y-%m-%dT%H%M%S"),
        naming::to_underscore(name),
        extension.trim_start_matches('.')
    )
}

/// Create an empty migration file in `dir` and return its path.
///
/// An empty name is rejected; an existing file is never overwritten.
pub fn new_migration(dir: impl AsRef<Path>, name: &str, extension: &str) -> OrmResult<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return Err(OrmError::validation("migration name is missing"));
    }
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join(migration_file_name(name, extension, Utc::now()));
    match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(OrmError::validation(format!(
                "migration {} already exists",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    }
    tracing::info!(target: "pgrecord.migrate", path = %path.display(), "created migration");
    Ok(path)
}
