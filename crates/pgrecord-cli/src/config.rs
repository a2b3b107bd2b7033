use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub config_path: PathBuf,
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;
        Self::from_toml(config_path, &raw)
    }

    /// Like [`ProjectConfig::load`], but a missing file yields the defaults
    /// rooted at the current directory.
    pub fn load_optional(config_path: PathBuf) -> anyhow::Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }
        tracing::debug!(path = %config_path.display(), "config file not found; using defaults");
        Ok(Self {
            config_dir: PathBuf::from("."),
            config_path,
            file: ConfigFile::default(),
        })
    }

    fn from_toml(config_path: PathBuf, raw: &str) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let mut file: ConfigFile = toml::from_str(raw).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e}",
                config_path.display()
            )
        })?;

        file.expand_env()?;
        file.validate()?;

        Ok(Self {
            config_path,
            config_dir,
            file,
        })
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    /// Migration directory: the CLI flag wins over the config file.
    pub fn migrations_dir(&self, flag: Option<&Path>) -> PathBuf {
        match flag {
            Some(dir) => dir.to_path_buf(),
            None => self.resolve_path(&self.file.migrations.dir),
        }
    }

    pub fn migrations_extension<'a>(&'a self, flag: Option<&'a str>) -> &'a str {
        flag.unwrap_or(&self.file.migrations.extension)
    }

    pub fn models_dir(&self, flag: Option<&Path>) -> PathBuf {
        match flag {
            Some(dir) => dir.to_path_buf(),
            None => self.resolve_path(&self.file.models.dir),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,

    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub migrations: MigrationsConfig,

    #[serde(default)]
    pub models: ModelsConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: None,
            migrations: MigrationsConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    pgrecord::pool::DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Clone, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default = "default_migrations_dir")]
    pub dir: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Extension (without the dot) to interpreter command, e.g. `js = "node"`.
    #[serde(default)]
    pub interpreters: BTreeMap<String, String>,
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_extension() -> String {
    "sql".to_string()
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            extension: default_extension(),
            interpreters: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_models_dir")]
    pub dir: String,
}

fn default_models_dir() -> String {
    "src/models".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
        }
    }
}

impl ConfigFile {
    fn expand_env(&mut self) -> anyhow::Result<()> {
        if let Some(db) = self.database.as_mut() {
            db.url = expand_env_vars(&db.url)?;
        }
        self.migrations.dir = expand_env_vars(&self.migrations.dir)?;
        for cmd in self.migrations.interpreters.values_mut() {
            *cmd = expand_env_vars(cmd)?;
        }
        self.models.dir = expand_env_vars(&self.models.dir)?;
        Ok(())
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        if self.version.trim() != "1" {
            anyhow::bail!("unsupported config version: {}", self.version);
        }
        if let Some(db) = self.database.as_ref() {
            if db.url.trim().is_empty() {
                anyhow::bail!("database.url must not be empty");
            }
            if db.max_connections == 0 {
                anyhow::bail!("database.max_connections must be greater than 0");
            }
        }
        if self.migrations.dir.trim().is_empty() {
            anyhow::bail!("migrations.dir must not be empty");
        }
        self.migrations.extension = self.migrations.extension.trim_start_matches('.').to_string();
        if self.migrations.extension.is_empty() {
            anyhow::bail!("migrations.extension must not be empty");
        }
        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            out.push(c);
            continue;
        }
        chars.next();

        let mut key = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            key.push(ch);
        }

        if !closed {
            anyhow::bail!("unterminated env var reference: ${{{key}}}");
        }
        if key.is_empty() {
            anyhow::bail!("invalid env var reference: ${{}}");
        }
        let v = std::env::var(&key)
            .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
        out.push_str(&v);
    }

    Ok(out)
}
