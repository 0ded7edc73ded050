//! The migration dependency graph.
//!
//! Nodes are addressed by migration name inside the graph's own maps;
//! parent/child links are stored as name lists, never as object
//! references, so there are no ownership cycles. Traversal order is
//! deterministic: node names come from sorted maps and adjacency lists are
//! sorted before walking.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use girder_core::{MigrateError, MigrateResult};

use crate::migration::Migration;
use crate::state::ProjectState;

/// Parent/child links for one node, by name.
#[derive(Debug, Default, Clone)]
struct NodeFamily {
    parents: Vec<String>,
    children: Vec<String>,
}

/// A directed acyclic graph of migrations.
#[derive(Debug, Default)]
pub struct MigrationGraph {
    families: BTreeMap<String, NodeFamily>,
    migrations: BTreeMap<String, Migration>,
}

impl MigrationGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration as a node.
    ///
    /// Registering the same name twice is an error, never a silent
    /// replace.
    pub fn add_node(&mut self, migration: Migration) -> MigrateResult<()> {
        if self.migrations.contains_key(&migration.name) {
            return Err(MigrateError::DuplicateNode(migration.name));
        }
        self.families
            .insert(migration.name.clone(), NodeFamily::default());
        self.migrations.insert(migration.name.clone(), migration);
        Ok(())
    }

    /// Adds a dependency edge: `child` depends on `parent`.
    ///
    /// Both nodes must already be present; the error names the missing
    /// node and the migration whose dependency list referenced it.
    pub fn add_dependency(&mut self, child: &str, parent: &str) -> MigrateResult<()> {
        for name in [child, parent] {
            if !self.families.contains_key(name) {
                return Err(MigrateError::UnknownNode {
                    missing: name.to_string(),
                    wanted_by: child.to_string(),
                });
            }
        }
        if let Some(family) = self.families.get_mut(child) {
            family.parents.push(parent.to_string());
        }
        if let Some(family) = self.families.get_mut(parent) {
            family.children.push(child.to_string());
        }
        Ok(())
    }

    /// Node names with no dependents, lexicographically sorted.
    pub fn leaf_nodes(&self) -> Vec<String> {
        self.families
            .iter()
            .filter(|(_, f)| f.children.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Node names with no dependencies, lexicographically sorted.
    pub fn root_nodes(&self) -> Vec<String> {
        self.families
            .iter()
            .filter(|(_, f)| f.parents.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All ancestors of `name`, oldest first, ending with `name` itself.
    ///
    /// This is exactly the order operations must be replayed to
    /// reconstruct state up to `name`. Duplicate-free even over diamond
    /// dependencies.
    pub fn before_lineage(&self, name: &str) -> MigrateResult<Vec<String>> {
        // The postorder along parent edges is already dependency-first.
        self.lineage(name, |family| &family.parents)
    }

    /// `name` itself first, then all descendants, newest last.
    ///
    /// Used to find everything that must be rolled back when `name` is
    /// rolled back.
    pub fn after_lineage(&self, name: &str) -> MigrateResult<Vec<String>> {
        self.lineage(name, |family| &family.children)
            .map(|mut names| {
                names.reverse();
                names
            })
    }

    /// Depth-first traversal along `edges`, emitting each node only after
    /// its whole subtree has been emitted (postorder), starting at `name`.
    /// The result has `name` last. On a DAG this is a topological order:
    /// every edge target precedes the nodes that point at it, diamonds
    /// included.
    fn lineage<'a, F>(&'a self, name: &str, edges: F) -> MigrateResult<Vec<String>>
    where
        F: Fn(&'a NodeFamily) -> &'a Vec<String>,
    {
        if !self.families.contains_key(name) {
            return Err(MigrateError::NodeNotFound(name.to_string()));
        }

        let mut result = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        // (node, expanded): a node is pushed once to expand its neighbors
        // and once more, beneath them, to be emitted after they are.
        let mut stack: Vec<(&str, bool)> = vec![(name, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                result.push(current.to_string());
                continue;
            }
            if !seen.insert(current) {
                continue;
            }
            stack.push((current, true));
            if let Some(family) = self.families.get(current) {
                let mut next: Vec<&str> = edges(family).iter().map(String::as_str).collect();
                next.sort_unstable();
                // Reverse so the lexicographically first neighbor is
                // expanded (and emitted) first.
                for neighbor in next.into_iter().rev() {
                    if !seen.contains(neighbor) {
                        stack.push((neighbor, false));
                    }
                }
            }
        }
        Ok(result)
    }

    /// The full replay order: the union of `before_lineage` of every
    /// leaf, in lexicographic leaf order, first-seen-wins.
    pub fn replay_order(&self) -> MigrateResult<Vec<String>> {
        let mut order = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for leaf in self.leaf_nodes() {
            for name in self.before_lineage(&leaf)? {
                if seen.insert(name.clone()) {
                    order.push(name);
                }
            }
        }
        Ok(order)
    }

    /// Builds the project state implied by the whole graph, by replaying
    /// every migration in [`replay_order`](Self::replay_order).
    pub fn project_state(&self) -> MigrateResult<ProjectState> {
        let mut state = ProjectState::new();
        for name in self.replay_order()? {
            if let Some(migration) = self.migrations.get(&name) {
                migration.mutate_state(&mut state)?;
            }
        }
        Ok(state)
    }

    /// Verifies the graph is acyclic.
    pub fn validate(&self) -> MigrateResult<()> {
        // Kahn's algorithm; anything left unprocessed sits on a cycle.
        let mut in_degree: BTreeMap<&str, usize> = self
            .families
            .iter()
            .map(|(name, family)| (name.as_str(), family.parents.len()))
            .collect();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut processed = 0_usize;
        while let Some(name) = queue.pop_front() {
            processed += 1;
            if let Some(family) = self.families.get(name) {
                for child in &family.children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }

        if processed == self.families.len() {
            Ok(())
        } else {
            let on_cycle = in_degree
                .iter()
                .find(|(_, d)| **d > 0)
                .map_or_else(String::new, |(name, _)| (*name).to_string());
            Err(MigrateError::CyclicDependency(on_cycle))
        }
    }

    /// Looks up a migration by name.
    pub fn migration(&self, name: &str) -> Option<&Migration> {
        self.migrations.get(name)
    }

    /// Like [`migration`](Self::migration) but errors when absent.
    pub fn require_migration(&self, name: &str) -> MigrateResult<&Migration> {
        self.migrations
            .get(name)
            .ok_or_else(|| MigrateError::NodeNotFound(name.to_string()))
    }

    /// The direct dependents of a node, sorted.
    pub fn children(&self, name: &str) -> Vec<String> {
        let mut children = self
            .families
            .get(name)
            .map(|f| f.children.clone())
            .unwrap_or_default();
        children.sort_unstable();
        children
    }

    /// All node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        self.migrations.keys().cloned().collect()
    }

    /// Whether the graph contains a node.
    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    /// The number of nodes.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::Operation;
    use crate::state::ModelState;
    use girder_model::{FieldDef, FieldType};

    fn empty(name: &str) -> Migration {
        Migration::new(name)
    }

    /// A chain 0001 <- 0002 <- ... for quick construction.
    fn chain(graph: &mut MigrationGraph, names: &[&str]) {
        for name in names {
            graph.add_node(empty(name)).unwrap();
        }
        for pair in names.windows(2) {
            graph.add_dependency(pair[1], pair[0]).unwrap();
        }
    }

    // ── Node and edge bookkeeping ───────────────────────────────────

    #[test]
    fn test_add_node_duplicate_is_error() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("0001_initial")).unwrap();
        let err = g.add_node(empty("0001_initial")).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateNode(name) if name == "0001_initial"));
    }

    #[test]
    fn test_add_dependency_missing_parent_names_both() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("0002_add_title")).unwrap();
        let err = g.add_dependency("0002_add_title", "0001_initial").unwrap_err();
        match err {
            MigrateError::UnknownNode { missing, wanted_by } => {
                assert_eq!(missing, "0001_initial");
                assert_eq!(wanted_by, "0002_add_title");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_leaf_and_root_nodes() {
        let mut g = MigrationGraph::new();
        chain(&mut g, &["0001_initial", "0002_add_title"]);
        assert_eq!(g.leaf_nodes(), vec!["0002_add_title"]);
        assert_eq!(g.root_nodes(), vec!["0001_initial"]);
    }

    #[test]
    fn test_two_leaves_detected() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("0001_initial")).unwrap();
        g.add_node(empty("0002_a")).unwrap();
        g.add_node(empty("0002_b")).unwrap();
        g.add_dependency("0002_a", "0001_initial").unwrap();
        g.add_dependency("0002_b", "0001_initial").unwrap();
        assert_eq!(g.leaf_nodes(), vec!["0002_a", "0002_b"]);
    }

    // ── Lineage ordering ────────────────────────────────────────────

    #[test]
    fn test_before_lineage_ends_with_node() {
        let mut g = MigrationGraph::new();
        chain(&mut g, &["0001_initial", "0002_add_title", "0003_add_body"]);
        let lineage = g.before_lineage("0003_add_body").unwrap();
        assert_eq!(
            lineage,
            vec!["0001_initial", "0002_add_title", "0003_add_body"]
        );
    }

    #[test]
    fn test_after_lineage_starts_with_node() {
        let mut g = MigrationGraph::new();
        chain(&mut g, &["0001_initial", "0002_add_title", "0003_add_body"]);
        let lineage = g.after_lineage("0001_initial").unwrap();
        assert_eq!(
            lineage,
            vec!["0001_initial", "0002_add_title", "0003_add_body"]
        );
    }

    #[test]
    fn test_before_lineage_diamond_no_duplicates() {
        // 0001 <- 0002_a, 0001 <- 0002_b, both <- 0003_merge
        let mut g = MigrationGraph::new();
        for name in ["0001_initial", "0002_a", "0002_b", "0003_merge"] {
            g.add_node(empty(name)).unwrap();
        }
        g.add_dependency("0002_a", "0001_initial").unwrap();
        g.add_dependency("0002_b", "0001_initial").unwrap();
        g.add_dependency("0003_merge", "0002_a").unwrap();
        g.add_dependency("0003_merge", "0002_b").unwrap();

        let lineage = g.before_lineage("0003_merge").unwrap();
        assert_eq!(lineage.last().map(String::as_str), Some("0003_merge"));
        let unique: HashSet<&String> = lineage.iter().collect();
        assert_eq!(unique.len(), lineage.len());
        assert_eq!(lineage.len(), 4);
        // Ancestors precede dependents.
        let pos = |n: &str| lineage.iter().position(|x| x == n).unwrap();
        assert!(pos("0001_initial") < pos("0002_a"));
        assert!(pos("0001_initial") < pos("0002_b"));
        assert!(pos("0002_a") < pos("0003_merge"));
        assert!(pos("0002_b") < pos("0003_merge"));
    }

    #[test]
    fn test_after_lineage_diamond_dependents_last() {
        let mut g = MigrationGraph::new();
        for name in ["0001_initial", "0002_a", "0002_b", "0003_merge"] {
            g.add_node(empty(name)).unwrap();
        }
        g.add_dependency("0002_a", "0001_initial").unwrap();
        g.add_dependency("0002_b", "0001_initial").unwrap();
        g.add_dependency("0003_merge", "0002_a").unwrap();
        g.add_dependency("0003_merge", "0002_b").unwrap();

        let lineage = g.after_lineage("0001_initial").unwrap();
        assert_eq!(lineage.first().map(String::as_str), Some("0001_initial"));
        assert_eq!(lineage.last().map(String::as_str), Some("0003_merge"));
        assert_eq!(lineage.len(), 4);
        // Walking the lineage newest-first unapplies the merge before
        // either branch, and both branches before the root.
        let pos = |n: &str| lineage.iter().position(|x| x == n).unwrap();
        assert!(pos("0002_a") < pos("0003_merge"));
        assert!(pos("0002_b") < pos("0003_merge"));
    }

    #[test]
    fn test_replay_order_merge_graph_is_topological() {
        let mut g = MigrationGraph::new();
        for name in ["0001_initial", "0002_a", "0002_b", "0003_merge"] {
            g.add_node(empty(name)).unwrap();
        }
        g.add_dependency("0002_a", "0001_initial").unwrap();
        g.add_dependency("0002_b", "0001_initial").unwrap();
        g.add_dependency("0003_merge", "0002_a").unwrap();
        g.add_dependency("0003_merge", "0002_b").unwrap();

        assert_eq!(
            g.replay_order().unwrap(),
            vec!["0001_initial", "0002_a", "0002_b", "0003_merge"]
        );
    }

    #[test]
    fn test_lineage_unknown_node() {
        let g = MigrationGraph::new();
        assert!(matches!(
            g.before_lineage("0001_missing"),
            Err(MigrateError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_replay_order_multiple_leaves_lexicographic() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("0001_initial")).unwrap();
        g.add_node(empty("0002_b")).unwrap();
        g.add_node(empty("0002_a")).unwrap();
        g.add_dependency("0002_a", "0001_initial").unwrap();
        g.add_dependency("0002_b", "0001_initial").unwrap();

        // Shared ancestor appears once, from the first leaf's lineage.
        let order = g.replay_order().unwrap();
        assert_eq!(order, vec!["0001_initial", "0002_a", "0002_b"]);
    }

    // ── State replay ────────────────────────────────────────────────

    #[test]
    fn test_project_state_replays_operations() {
        let mut g = MigrationGraph::new();
        g.add_node(
            Migration::new("0001_initial")
                .initial()
                .operation(Operation::CreateModel {
                    model: ModelState::new("author", vec![FieldDef::auto_pk()]),
                }),
        )
        .unwrap();
        g.add_node(
            Migration::new("0002_add_name").operation(Operation::AddField {
                model: "author".into(),
                field: FieldDef::new("name", FieldType::Char { max_length: 100 }),
            }),
        )
        .unwrap();
        g.add_dependency("0002_add_name", "0001_initial").unwrap();

        let state = g.project_state().unwrap();
        let author = state.get_model("author").unwrap();
        assert_eq!(author.fields.len(), 2);
        assert!(author.field("name").is_some());
    }

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn test_validate_acyclic_ok() {
        let mut g = MigrationGraph::new();
        chain(&mut g, &["0001_initial", "0002_add_title"]);
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("a")).unwrap();
        g.add_node(empty("b")).unwrap();
        g.add_dependency("b", "a").unwrap();
        g.add_dependency("a", "b").unwrap();
        assert!(matches!(
            g.validate(),
            Err(MigrateError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_children_sorted() {
        let mut g = MigrationGraph::new();
        g.add_node(empty("0001_initial")).unwrap();
        g.add_node(empty("0002_z")).unwrap();
        g.add_node(empty("0002_a")).unwrap();
        g.add_dependency("0002_z", "0001_initial").unwrap();
        g.add_dependency("0002_a", "0001_initial").unwrap();
        assert_eq!(g.children("0001_initial"), vec!["0002_a", "0002_z"]);
    }
}
