use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "pgrecord.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Migration,
    MigrationRun,
    MigrationNew,
    MigrationStatus,
    Model,
    ModelNew,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Migration(MigrationCommand),
    Model(ModelCommand),
}

#[derive(Debug, Clone)]
pub enum MigrationCommand {
    Run(MigrationRunArgs),
    New(MigrationNewArgs),
    Status(MigrationStatusArgs),
}

#[derive(Debug, Clone)]
pub struct MigrationRunArgs {
    pub config: PathBuf,
    pub database: Option<String>,
    pub dir: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct MigrationNewArgs {
    pub config: PathBuf,
    pub dir: Option<PathBuf>,
    pub ext: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MigrationStatusArgs {
    pub config: PathBuf,
    pub database: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ModelCommand {
    New(ModelNewArgs),
}

#[derive(Debug, Clone)]
pub struct ModelNewArgs {
    pub config: PathBuf,
    pub dir: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
    pub ext: Option<String>,
    pub name: String,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "migration" => parse_migration(it.map(|s| s.as_str())),
        "model" => parse_model(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first} (see `pgrecord --help`)"),
    }
}

/// Options shared by every subcommand. Each parser picks the ones it accepts.
#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    database: Option<String>,
    dir: Option<PathBuf>,
    models_dir: Option<PathBuf>,
    ext: Option<String>,
    dry_run: bool,
    positional: Vec<String>,
    help: bool,
}

impl Options {
    fn config(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }
}

fn take_value<'a>(
    flag: &str,
    token: &'a str,
    it: &mut impl Iterator<Item = &'a str>,
) -> anyhow::Result<Option<&'a str>> {
    if token == flag {
        let Some(v) = it.next() else {
            anyhow::bail!("{flag} requires a value");
        };
        return Ok(Some(v));
    }
    Ok(token.strip_prefix(flag).and_then(|rest| rest.strip_prefix('=')))
}

fn parse_options<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Options> {
    let mut opts = Options::default();
    while let Some(token) = it.next() {
        if token == "-h" || token == "--help" {
            opts.help = true;
        } else if token == "--dry-run" {
            opts.dry_run = true;
        } else if let Some(v) = take_value("--config", token, &mut it)? {
            opts.config = Some(PathBuf::from(v));
        } else if let Some(v) = take_value("--database", token, &mut it)? {
            opts.database = Some(v.to_string());
        } else if let Some(v) = take_value("--models-dir", token, &mut it)? {
            opts.models_dir = Some(PathBuf::from(v));
        } else if let Some(v) = take_value("--dir", token, &mut it)? {
            opts.dir = Some(PathBuf::from(v));
        } else if let Some(v) = take_value("--ext", token, &mut it)? {
            opts.ext = Some(v.trim_start_matches('.').to_string());
        } else if token.starts_with('-') {
            anyhow::bail!("unknown argument: {token}");
        } else {
            opts.positional.push(token.to_string());
        }
    }
    Ok(opts)
}

fn parse_migration<'a>(it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let opts = parse_options(it)?;
    let mut positional = opts.positional.iter().map(String::as_str);
    let subcmd = positional.next();

    if opts.help {
        return Ok(Command::Help(match subcmd {
            None => HelpTopic::Migration,
            Some("run") => HelpTopic::MigrationRun,
            Some("new") => HelpTopic::MigrationNew,
            Some("status") => HelpTopic::MigrationStatus,
            Some(other) => anyhow::bail!("unknown subcommand: {other}"),
        }));
    }

    let cmd = match subcmd {
        // `pgrecord migration` on its own runs pending migrations.
        None | Some("run") => {
            if opts.ext.is_some() || opts.models_dir.is_some() {
                anyhow::bail!("invalid options for `migration run`");
            }
            if let Some(extra) = positional.next() {
                anyhow::bail!("unexpected positional argument: {extra}");
            }
            MigrationCommand::Run(MigrationRunArgs {
                config: opts.config(),
                database: opts.database.clone(),
                dir: opts.dir.clone(),
                dry_run: opts.dry_run,
            })
        }
        Some("new") => {
            if opts.database.is_some() || opts.dry_run || opts.models_dir.is_some() {
                anyhow::bail!("invalid options for `migration new`");
            }
            let Some(name) = positional.next() else {
                anyhow::bail!("migration name is missing: usage `pgrecord migration new <name>`");
            };
            if let Some(extra) = positional.next() {
                anyhow::bail!("unexpected positional argument: {extra}");
            }
            MigrationCommand::New(MigrationNewArgs {
                config: opts.config(),
                dir: opts.dir.clone(),
                ext: opts.ext.clone(),
                name: name.to_string(),
            })
        }
        Some("status") => {
            if opts.ext.is_some() || opts.dry_run || opts.models_dir.is_some() {
                anyhow::bail!("invalid options for `migration status`");
            }
            MigrationCommand::Status(MigrationStatusArgs {
                config: opts.config(),
                database: opts.database.clone(),
                dir: opts.dir.clone(),
            })
        }
        Some(other) => anyhow::bail!("unknown subcommand: {other}"),
    };

    Ok(Command::Migration(cmd))
}

fn parse_model<'a>(it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let opts = parse_options(it)?;
    let mut positional = opts.positional.iter().map(String::as_str);
    let subcmd = positional.next();

    if opts.help {
        return Ok(Command::Help(match subcmd {
            None => HelpTopic::Model,
            Some("new") => HelpTopic::ModelNew,
            Some(other) => anyhow::bail!("unknown subcommand: {other}"),
        }));
    }

    match subcmd {
        None => Ok(Command::Help(HelpTopic::Model)),
        Some("new") => {
            if opts.database.is_some() || opts.dry_run {
                anyhow::bail!("invalid options for `model new`");
            }
            let Some(name) = positional.next() else {
                anyhow::bail!("model name is missing: usage `pgrecord model new <Name>`");
            };
            if let Some(extra) = positional.next() {
                anyhow::bail!("unexpected positional argument: {extra}");
            }
            Ok(Command::Model(ModelCommand::New(ModelNewArgs {
                config: opts.config(),
                dir: opts.dir.clone(),
                models_dir: opts.models_dir.clone(),
                ext: opts.ext.clone(),
                name: name.to_string(),
            })))
        }
        Some(other) => anyhow::bail!("unknown subcommand: {other}"),
    }
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
USAGE:
  pgrecord <COMMAND> [OPTIONS]

COMMANDS:
  migration [run]       Apply pending migrations (default)
  migration new <name>  Create an empty migration file
  migration status      Show local/applied/pending migrations
  model new <Name>      Create a model file and its create_<name> migration

OPTIONS:
  -h, --help            Print help

Run `pgrecord <command> --help` for more."
            );
        }
        HelpTopic::Migration => {
            println!(
                "\
USAGE:
  pgrecord migration <SUBCOMMAND> [OPTIONS]

SUBCOMMANDS:
  run                   Apply pending migrations in file name order (default)
  new <name>            Create an empty, timestamped migration file
  status                Show local/applied/pending migrations

Run `pgrecord migration <subcommand> --help` for more."
            );
        }
        HelpTopic::MigrationRun => {
            println!(
                "\
USAGE:
  pgrecord migration run [OPTIONS]

NOTES:
  Creates the `migrations` ledger table and the migration directory if missing.
  Stops at the first failing migration; earlier ones stay applied.

OPTIONS:
  --config <FILE>       Config file path (default: pgrecord.toml)
  --database <URL>      Database URL (overrides config and DATABASE_URL)
  --dir <DIR>           Migration directory (default: migrations)
  --dry-run             Print migrations that would be applied
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrationNew => {
            println!(
                "\
USAGE:
  pgrecord migration new <name> [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: pgrecord.toml)
  --dir <DIR>           Migration directory (default: migrations)
  --ext <EXT>           File extension (default: sql)
  -h, --help            Print help"
            );
        }
        HelpTopic::MigrationStatus => {
            println!(
                "\
USAGE:
  pgrecord migration status [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: pgrecord.toml)
  --database <URL>      Database URL (overrides config and DATABASE_URL)
  --dir <DIR>           Migration directory (default: migrations)
  -h, --help            Print help"
            );
        }
        HelpTopic::Model | HelpTopic::ModelNew => {
            println!(
                "\
USAGE:
  pgrecord model new <Name> [OPTIONS]

NOTES:
  Writes <models-dir>/<name>.rs and a create_<name> migration.

OPTIONS:
  --config <FILE>       Config file path (default: pgrecord.toml)
  --models-dir <DIR>    Model directory (default: src/models)
  --dir <DIR>           Migration directory (default: migrations)
  --ext <EXT>           Migration file extension (default: sql)
  -h, --help            Print help"
            );
        }
    }
}
