//! Reading and writing migration files.
//!
//! A migration is stored as one pretty-printed JSON file named
//! `<migration name>.json`. The file stem is authoritative for the name;
//! a stale `name` field inside the file is overwritten on load so a
//! renamed file cannot desynchronize the graph.

use std::fs;
use std::path::{Path, PathBuf};

use girder_core::MigrateResult;
use tracing::debug;

use crate::migration::Migration;

/// Serializes a migration to pretty JSON.
pub fn to_json(migration: &Migration) -> MigrateResult<String> {
    Ok(serde_json::to_string_pretty(migration)?)
}

/// Deserializes a migration from JSON.
pub fn from_json(json: &str) -> MigrateResult<Migration> {
    Ok(serde_json::from_str(json)?)
}

/// Writes `migration` into `dir` as `<name>.json`, creating the
/// directory if needed. Returns the file path.
pub fn write_migration(dir: &Path, migration: &Migration) -> MigrateResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", migration.name));
    let mut json = to_json(migration)?;
    json.push('\n');
    fs::write(&path, json)?;
    debug!(path = %path.display(), "wrote migration file");
    Ok(path)
}

/// Reads a migration from `path`, taking the name from the file stem.
pub fn read_migration(path: &Path) -> MigrateResult<Migration> {
    let json = fs::read_to_string(path)?;
    let mut migration = from_json(&json)?;
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        migration.name = stem.to_string();
    }
    Ok(migration)
}
