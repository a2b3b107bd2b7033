use crate::cli::{ModelCommand, ModelNewArgs};
use crate::config::ProjectConfig;
use anyhow::Context;
use colored::Colorize;
use heck::{ToSnakeCase, ToUpperCamelCase};
use pgrecord::{migrate, naming};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn run(cmd: ModelCommand) -> anyhow::Result<()> {
    match cmd {
        ModelCommand::New(args) => run_new(args),
    }
}

fn run_new(args: ModelNewArgs) -> anyhow::Result<()> {
    let cfg = ProjectConfig::load_optional(args.config)?;
    let models_dir = cfg.models_dir(args.models_dir.as_deref());
    let migrations_dir = cfg.migrations_dir(args.dir.as_deref());
    let ext = cfg.migrations_extension(args.ext.as_deref());

    let created = scaffold(&args.name, &models_dir, &migrations_dir, ext)?;
    println!("{} {}", "created".green(), created.model.display());
    println!("{} {}", "created".green(), created.migration.display());
    Ok(())
}

#[derive(Debug)]
struct Scaffold {
    model: PathBuf,
    migration: PathBuf,
}

fn scaffold(
    name: &str,
    models_dir: &Path,
    migrations_dir: &Path,
    ext: &str,
) -> anyhow::Result<Scaffold> {
    let type_name = name.trim().to_upper_camel_case();
    if type_name.is_empty() {
        anyhow::bail!("model name is missing");
    }
    let file_stem = type_name.to_snake_case();
    let table = naming::table_name(&type_name);

    std::fs::create_dir_all(models_dir)
        .with_context(|| format!("failed to create {}", models_dir.display()))?;
    let model = models_dir.join(format!("{file_stem}.rs"));
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&model)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                anyhow::anyhow!("refusing to overwrite existing file: {}", model.display())
            }
            _ => anyhow::anyhow!("failed to create {}: {e}", model.display()),
        })?;
    file.write_all(model_template(&type_name).as_bytes())
        .with_context(|| format!("failed to write {}", model.display()))?;

    drop(file);

    match write_migration(&file_stem, &table, migrations_dir, ext) {
        Ok(migration) => Ok(Scaffold { model, migration }),
        Err(err) => {
            // The model file was created above, so it is ours to remove.
            if let Err(e) = std::fs::remove_file(&model) {
                tracing::warn!(path = %model.display(), error = %e, "failed to remove model file");
            }
            Err(err)
        }
    }
}

fn write_migration(
    file_stem: &str,
    table: &str,
    migrations_dir: &Path,
    ext: &str,
) -> anyhow::Result<PathBuf> {
    let migration = migrate::new_migration(migrations_dir, &format!("create_{file_stem}"), ext)?;
    if ext.trim_start_matches('.') == "sql" {
        std::fs::write(&migration, create_table_template(table))
            .with_context(|| format!("failed to write {}", migration.display()))?;
    }
    Ok(migration)
}

fn model_template(type_name: &str) -> String {
    format!(
        "\
use pgrecord::{{ColumnType, Model, Relation}};

pub struct {type_name};

impl Model for {type_name} {{
    const NAME: &'static str = \"{type_name}\";

    fn columns() -> Vec<(&'static str, ColumnType)> {{
        vec![]
    }}

    fn relations() -> Vec<Relation> {{
        vec![]
    }}
}}
"
    )
}

fn create_table_template(table: &str) -> String {
    format!(
        "\
CREATE TABLE {table} (
    id SERIAL PRIMARY KEY
);
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pgrecord-cli-model-{label}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_model_and_create_table_migration() {
        let root = temp_dir("sql");
        let created = scaffold(
            "user_photo",
            &root.join("models"),
            &root.join("migrations"),
            "sql",
        )
        .unwrap();

        assert_eq!(created.model, root.join("models/user_photo.rs"));
        let model = std::fs::read_to_string(&created.model).unwrap();
        assert!(model.contains("pub struct UserPhoto;"));
        assert!(model.contains("const NAME: &'static str = \"UserPhoto\";"));

        let name = created.migration.file_name().unwrap().to_string_lossy();
        assert!(name.ends_with("_create_user_photo.sql"), "{name}");
        let sql = std::fs::read_to_string(&created.migration).unwrap();
        assert!(sql.starts_with("CREATE TABLE user_photos ("));

        let err = scaffold(
            "UserPhoto",
            &root.join("models"),
            &root.join("migrations"),
            "sql",
        )
        .unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn failed_migration_leaves_no_model_behind() {
        let root = temp_dir("blocked");
        std::fs::create_dir_all(&root).unwrap();
        let blocker = root.join("migrations");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = scaffold("Sheep", &root.join("models"), &blocker, "sql");
        assert!(err.is_err());
        assert!(!root.join("models/sheep.rs").exists());

        std::fs::remove_file(&blocker).unwrap();
        let created = scaffold("Sheep", &root.join("models"), &blocker, "sql").unwrap();
        assert!(created.model.exists());
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn script_migrations_start_empty() {
        let root = temp_dir("js");
        let created = scaffold("Sheep", &root.join("models"), &root.join("migrations"), "js")
            .unwrap();
        assert!(std::fs::read_to_string(&created.migration).unwrap().is_empty());
        assert!(scaffold(" ", &root.join("models"), &root.join("migrations"), "js").is_err());
        std::fs::remove_dir_all(root).unwrap();
    }
}
