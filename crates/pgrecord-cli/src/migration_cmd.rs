use crate::cli::{MigrationCommand, MigrationNewArgs, MigrationRunArgs, MigrationStatusArgs};
use crate::config::ProjectConfig;
use anyhow::Context;
use colored::Colorize;
use pgrecord::migrate::{self, ProcessRunner};
use pgrecord::{GenericClient, Value};
use std::path::Path;

pub async fn run(cmd: MigrationCommand) -> anyhow::Result<()> {
    match cmd {
        MigrationCommand::Run(args) => run_migrations(args).await,
        MigrationCommand::New(args) => run_new(args),
        MigrationCommand::Status(args) => run_status(args).await,
    }
}

/// `--database` wins, then the config file, then `DATABASE_URL`.
pub(crate) fn resolve_database_url(
    flag: Option<&str>,
    cfg: &ProjectConfig,
) -> anyhow::Result<String> {
    if let Some(url) = flag {
        return Ok(url.to_string());
    }
    if let Some(db) = cfg.file.database.as_ref() {
        return Ok(db.url.clone());
    }
    std::env::var("DATABASE_URL").map_err(|_| {
        anyhow::anyhow!(
            "no database configured: pass --database, set [database].url in {} or export DATABASE_URL",
            cfg.config_path.display()
        )
    })
}

fn max_connections(cfg: &ProjectConfig) -> usize {
    cfg.file
        .database
        .as_ref()
        .map(|db| db.max_connections)
        .unwrap_or(pgrecord::pool::DEFAULT_MAX_CONNECTIONS)
}

pub(crate) fn process_runner(cfg: &ProjectConfig, database_url: &str) -> ProcessRunner {
    cfg.file
        .migrations
        .interpreters
        .iter()
        .fold(ProcessRunner::new(), |runner, (ext, cmd)| {
            runner.interpreter(ext.as_str(), cmd.as_str())
        })
        .env("DATABASE_URL", database_url)
}

async fn run_migrations(args: MigrationRunArgs) -> anyhow::Result<()> {
    let cfg = ProjectConfig::load_optional(args.config)?;
    let dir = cfg.migrations_dir(args.dir.as_deref());
    let url = resolve_database_url(args.database.as_deref(), &cfg)?;

    let pool = pgrecord::create_pool_with_config(&url, max_connections(&cfg))?;
    {
        let client = pool.get().await.context("failed to connect to database")?;
        if args.dry_run {
            let (_, status) = read_status(&client, &dir).await?;
            if status.pending.is_empty() {
                println!("{}", "nothing to migrate".green());
            }
            for name in status.pending {
                println!("{} {name}", "pending".yellow());
            }
            return Ok(());
        }
        migrate::init(&client, &dir).await?;
    }

    let runner = process_runner(&cfg, &url);
    let report = migrate::run_pool(&pool, &dir, &runner).await?;
    if report.is_empty() {
        println!("{}", "nothing to migrate".green());
        return Ok(());
    }
    for applied in &report.applied {
        println!(
            "{} {} ({} ms)",
            "applied".green(),
            applied.file_name,
            applied.elapsed.as_millis()
        );
        let output = applied.output.trim_end();
        if !output.is_empty() {
            println!("{output}");
        }
    }
    println!("applied {} migration(s)", report.len());
    Ok(())
}

fn run_new(args: MigrationNewArgs) -> anyhow::Result<()> {
    let cfg = ProjectConfig::load_optional(args.config)?;
    let dir = cfg.migrations_dir(args.dir.as_deref());
    let ext = cfg.migrations_extension(args.ext.as_deref());

    let path = migrate::new_migration(&dir, &args.name, ext)?;
    println!("{} {}", "created".green(), path.display());
    Ok(())
}

async fn run_status(args: MigrationStatusArgs) -> anyhow::Result<()> {
    let cfg = ProjectConfig::load_optional(args.config)?;
    let dir = cfg.migrations_dir(args.dir.as_deref());
    let url = resolve_database_url(args.database.as_deref(), &cfg)?;

    let client = pgrecord::connect(&url).await?;
    let (has_ledger, status) = read_status(&client, &dir).await?;
    if !has_ledger {
        println!(
            "{}",
            "migrations table not found (run `pgrecord migration run` first)".yellow()
        );
    }

    println!("migrations dir: {}", dir.display());
    for name in &status.local {
        if status.applied.contains(name) {
            println!("  {} {name}", "applied".green());
        } else {
            println!("  {} {name}", "pending".yellow());
        }
    }
    println!(
        "{} local, {} applied, {} pending",
        status.local.len(),
        status.applied.len(),
        status.pending.len()
    );
    Ok(())
}

/// Migration status without creating the ledger table or the directory.
/// Returns whether the ledger table exists.
async fn read_status(
    client: &impl GenericClient,
    dir: &Path,
) -> anyhow::Result<(bool, migrate::MigrationStatus)> {
    let has_ledger = ledger_exists(client).await?;
    if dir.exists() && has_ledger {
        return Ok((true, migrate::status(client, dir).await?));
    }
    let local = local_or_empty(dir)?;
    Ok((
        has_ledger,
        migrate::MigrationStatus {
            pending: local.clone(),
            local,
            applied: Vec::new(),
        },
    ))
}

fn local_or_empty(dir: &Path) -> anyhow::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    Ok(migrate::local_migrations(dir)?)
}

async fn ledger_exists(client: &impl GenericClient) -> anyhow::Result<bool> {
    let rows = client
        .query("SELECT to_regclass('migrations') IS NOT NULL AS present", &[])
        .await
        .context("failed to check for the migrations table")?;
    Ok(rows
        .first()
        .and_then(|row| row.get("present"))
        .is_some_and(|v| *v == Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgrecord::{Attrs, OrmResult, attrs};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Answers the ledger lookup with `present` and records every statement.
    struct LedgerClient {
        present: bool,
        statements: Mutex<Vec<String>>,
    }

    impl GenericClient for LedgerClient {
        async fn query(&self, sql: &str, _values: &[Value]) -> OrmResult<Vec<Attrs>> {
            self.statements.lock().unwrap().push(sql.to_string());
            if sql.contains("to_regclass") {
                return Ok(vec![attrs! { "present" => self.present }]);
            }
            Ok(Vec::new())
        }

        async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
            self.query(sql, values).await.map(|rows| rows.len() as u64)
        }

        async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
            self.query(sql, &[]).await.map(|_| ())
        }
    }

    fn config(label: &str, raw: &str) -> ProjectConfig {
        let dir = std::env::temp_dir().join(format!(
            "pgrecord-cli-{label}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pgrecord.toml");
        std::fs::write(&path, raw).unwrap();
        ProjectConfig::load(path).unwrap()
    }

    #[test]
    fn flag_beats_config_url() {
        let cfg = config("flag-url", "version = \"1\"\n[database]\nurl = \"postgres://cfg/app\"\n");
        assert_eq!(
            resolve_database_url(Some("postgres://flag/app"), &cfg).unwrap(),
            "postgres://flag/app"
        );
        assert_eq!(
            resolve_database_url(None, &cfg).unwrap(),
            "postgres://cfg/app"
        );
        assert_eq!(max_connections(&cfg), pgrecord::pool::DEFAULT_MAX_CONNECTIONS);
        std::fs::remove_dir_all(&cfg.config_dir).unwrap();
    }

    #[tokio::test]
    async fn status_without_ledger_is_read_only() {
        let client = LedgerClient {
            present: false,
            statements: Mutex::new(Vec::new()),
        };
        let dir = std::env::temp_dir().join(format!(
            "pgrecord-cli-dry-run-{}/migrations",
            std::process::id()
        ));

        let (has_ledger, status) = read_status(&client, &dir).await.unwrap();
        assert!(!has_ledger);
        assert!(status.pending.is_empty());
        assert!(!dir.exists());
        let statements = client.statements.lock().unwrap().clone();
        assert_eq!(statements.len(), 1);
        assert!(!statements[0].contains("CREATE"));
    }

    #[tokio::test]
    async fn status_lists_local_files_as_pending_without_ledger() {
        let client = LedgerClient {
            present: false,
            statements: Mutex::new(Vec::new()),
        };
        let root = std::env::temp_dir().join(format!(
            "pgrecord-cli-pending-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("2024-01-01T000000_a.sql"), "").unwrap();

        let (_, status) = read_status(&client, &root).await.unwrap();
        assert_eq!(status.pending, ["2024-01-01T000000_a.sql"]);
        assert!(status.applied.is_empty());
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn new_uses_configured_extension() {
        let cfg = config("new-ext", "version = \"1\"\n[migrations]\nextension = \"sh\"\ndir = \"mig\"\n");
        run_new(MigrationNewArgs {
            config: cfg.config_path.clone(),
            dir: None,
            ext: None,
            name: "AddUsers".to_string(),
        })
        .unwrap();

        let dir: PathBuf = cfg.migrations_dir(None);
        let files = migrate::local_migrations(&dir).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("_add_users.sh"), "{}", files[0]);
        std::fs::remove_dir_all(&cfg.config_dir).unwrap();
    }
}
