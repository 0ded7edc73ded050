//! Discovers migration files on disk and assembles the graph.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use girder_core::{MigrateError, MigrateResult};
use tracing::debug;

use crate::graph::MigrationGraph;
use crate::migration::Migration;
use crate::serializer;

/// Loads migrations from a single directory and builds their graph.
#[derive(Debug)]
pub struct MigrationLoader {
    migrations_dir: PathBuf,
    /// Loaded migrations keyed by name.
    pub migrations: BTreeMap<String, Migration>,
}

impl MigrationLoader {
    /// Creates a loader over `migrations_dir`. Nothing is read until
    /// [`load`](Self::load).
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            migrations: BTreeMap::new(),
        }
    }

    /// The directory this loader reads from and writes to.
    pub fn dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Scans the directory, parses every `*.json` file, and builds the
    /// dependency graph. A missing directory loads as an empty graph.
    pub fn load(&mut self) -> MigrateResult<MigrationGraph> {
        self.migrations.clear();
        if self.migrations_dir.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(&self.migrations_dir)?
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            entries.sort();
            for path in entries {
                let migration = serializer::read_migration(&path)?;
                debug!(name = %migration.name, "loaded migration");
                self.migrations.insert(migration.name.clone(), migration);
            }
        }
        graph_from_migrations(self.migrations.values().cloned())
    }

    /// Writes a migration into the directory and registers it.
    pub fn save(&mut self, migration: &Migration) -> MigrateResult<PathBuf> {
        let path = serializer::write_migration(&self.migrations_dir, migration)?;
        self.migrations.insert(migration.name.clone(), migration.clone());
        Ok(path)
    }

    /// The next migration name: a four-digit sequence prefix followed by
    /// the description, e.g. `0003_add_author_bio`.
    pub fn next_name(&self, description: &str) -> String {
        let next = self
            .migrations
            .keys()
            .filter_map(|name| name.split('_').next())
            .filter_map(|prefix| prefix.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        format!("{next:04}_{description}")
    }

    /// Resolves a user-supplied target to a migration name.
    ///
    /// `"zero"` passes through (it means "before everything"). Otherwise
    /// the target must be a unique prefix of exactly one loaded name.
    pub fn resolve_target(&self, target: &str) -> MigrateResult<String> {
        if target == "zero" {
            return Ok(target.to_string());
        }
        if self.migrations.contains_key(target) {
            return Ok(target.to_string());
        }
        let matches: Vec<&String> = self
            .migrations
            .keys()
            .filter(|name| name.starts_with(target))
            .collect();
        match matches.as_slice() {
            [unique] => Ok((*unique).clone()),
            [] => Err(MigrateError::NodeNotFound(target.to_string())),
            _ => Err(MigrateError::AmbiguousTarget {
                prefix: target.to_string(),
                count: matches.len(),
            }),
        }
    }
}

/// Builds and validates a graph from an arbitrary migration collection.
///
/// Two passes: register every node, then wire dependencies, so declaration
/// order in the files never matters.
pub fn graph_from_migrations(
    migrations: impl IntoIterator<Item = Migration>,
) -> MigrateResult<MigrationGraph> {
    let migrations: Vec<Migration> = migrations.into_iter().collect();
    let mut graph = MigrationGraph::new();
    for migration in &migrations {
        graph.add_node(migration.clone())?;
    }
    for migration in &migrations {
        for dep in &migration.dependencies {
            graph.add_dependency(&migration.name, dep)?;
        }
    }
    graph.validate()?;
    Ok(graph)
}

/// Names of conflicting leaves, when the graph has more than one.
///
/// An empty result means history is linear enough to extend safely.
pub fn find_conflicts(graph: &MigrationGraph) -> Vec<String> {
    let leaves = graph.leaf_nodes();
    if leaves.len() > 1 {
        leaves
    } else {
        Vec::new()
    }
}
