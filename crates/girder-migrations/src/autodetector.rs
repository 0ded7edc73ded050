//! Diffs two project states into an ordered operation list.
//!
//! The detector is deterministic: given the same two states and the same
//! questioner answers it always emits the same operations in the same
//! order. Destructive interpretations (renames, backfill defaults) are
//! never guessed; they go through the [`Questioner`].

use std::collections::{BTreeMap, BTreeSet};

use girder_core::MigrateResult;
use girder_model::{FieldDef, FieldType, IndexDef, TriggerDef};
use tracing::debug;

use crate::operations::Operation;
use crate::questioner::Questioner;
use crate::state::{ModelState, ProjectState};

/// Detects the operations that turn `old_state` into `new_state`.
#[derive(Debug)]
pub struct AutoDetector {
    old_state: ProjectState,
    new_state: ProjectState,
}

impl AutoDetector {
    /// Creates a detector between two snapshots.
    pub fn new(old_state: ProjectState, new_state: ProjectState) -> Self {
        Self {
            old_state,
            new_state,
        }
    }

    /// Computes the ordered operation list.
    ///
    /// Emission order: model renames, model creations (dependency-sorted),
    /// then per surviving model its field and option changes, then model
    /// deletions (dependents first). Each emitted operation is replayed
    /// onto a working copy of the old state so later diffs see its effect.
    pub fn detect_changes(&self, questioner: &dyn Questioner) -> MigrateResult<Vec<Operation>> {
        let mut working = self.old_state.clone();
        let mut ops = Vec::new();

        let old_names: BTreeSet<String> = working.models.keys().cloned().collect();
        let new_names: BTreeSet<String> = self.new_state.models.keys().cloned().collect();
        let mut added: BTreeSet<String> = new_names.difference(&old_names).cloned().collect();
        let mut removed: BTreeSet<String> = old_names.difference(&new_names).cloned().collect();

        // Model renames: a removed model whose fields exactly match an
        // added one, confirmed by the questioner.
        for old_name in removed.clone() {
            let old_fields = match working.get_model(&old_name) {
                Some(m) => m.fields.clone(),
                None => continue,
            };
            let candidate = added.iter().find(|name| {
                self.new_state
                    .get_model(name)
                    .is_some_and(|m| m.fields == old_fields)
            });
            if let Some(new_name) = candidate.cloned() {
                if questioner.ask_rename_model(&old_name, &new_name) {
                    debug!(old = %old_name, new = %new_name, "model rename confirmed");
                    let op = Operation::RenameModel {
                        old_name: old_name.clone(),
                        new_name: new_name.clone(),
                    };
                    op.mutate_state(&mut working)?;
                    ops.push(op);
                    removed.remove(&old_name);
                    added.remove(&new_name);
                }
            }
        }

        // Creations, ordered so FK targets exist before their referents.
        for name in dependency_order(&self.new_state, &added) {
            if let Some(model) = self.new_state.get_model(&name) {
                let op = Operation::CreateModel {
                    model: model.clone(),
                };
                op.mutate_state(&mut working)?;
                ops.push(op);
            }
        }

        // Field and option changes on surviving models.
        let surviving: Vec<String> = self
            .new_state
            .models
            .keys()
            .filter(|name| working.models.contains_key(*name) && !added.contains(*name))
            .cloned()
            .collect();
        for name in &surviving {
            let model_ops = self.diff_model(&working, name, questioner)?;
            for op in model_ops {
                op.mutate_state(&mut working)?;
                ops.push(op);
            }
        }

        // Deletions, dependents before their targets.
        let mut deletions = dependency_order(&working, &removed);
        deletions.reverse();
        for name in deletions {
            let op = Operation::DeleteModel { name };
            op.mutate_state(&mut working)?;
            ops.push(op);
        }

        Ok(ops)
    }

    fn diff_model(
        &self,
        working: &ProjectState,
        name: &str,
        questioner: &dyn Questioner,
    ) -> MigrateResult<Vec<Operation>> {
        let old_model = working.require_model(name)?;
        let new_model = self.new_state.require_model(name)?;
        let mut ops = Vec::new();

        let old_fields: BTreeMap<String, FieldDef> = old_model
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();
        let new_fields: BTreeMap<String, FieldDef> = new_model
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();

        let mut added: BTreeSet<String> = new_fields
            .keys()
            .filter(|k| !old_fields.contains_key(*k))
            .cloned()
            .collect();
        let mut removed: BTreeSet<String> = old_fields
            .keys()
            .filter(|k| !new_fields.contains_key(*k))
            .cloned()
            .collect();

        // Field renames: identical definition modulo name (and a column
        // that tracked the name), confirmed by the questioner.
        for old_name in removed.clone() {
            let old_field = &old_fields[&old_name];
            let candidate = added.iter().find(|cand| {
                same_field_modulo_name(old_field, &new_fields[*cand])
            });
            if let Some(new_name) = candidate.cloned() {
                if questioner.ask_rename(name, &old_name, &new_name, old_field) {
                    ops.push(Operation::RenameField {
                        model: name.to_string(),
                        old_name: old_name.clone(),
                        new_name: new_name.clone(),
                    });
                    removed.remove(&old_name);
                    added.remove(&new_name);
                }
            }
        }

        // Additions, in the new model's declaration order.
        for field in &new_model.fields {
            if !added.contains(&field.name) {
                continue;
            }
            if field.field_type.is_many_to_many() {
                ops.push(Operation::AddManyToMany {
                    model: name.to_string(),
                    field: field.clone(),
                });
            } else {
                let mut field = field.clone();
                if !field.null && field.default.is_none() && !field.primary_key {
                    if let Some(value) = questioner.ask_not_null_default(name, &field.name) {
                        field.default = Some(value);
                    }
                }
                ops.push(Operation::AddField {
                    model: name.to_string(),
                    field,
                });
            }
        }

        // Alterations: same name, different definition. A concrete column
        // cannot become a relation set (or vice versa); that surfaces as
        // remove plus add instead.
        for field in &new_model.fields {
            let Some(old_field) = old_fields.get(&field.name) else {
                continue;
            };
            if old_field == field {
                continue;
            }
            if old_field.field_type.is_many_to_many() != field.field_type.is_many_to_many() {
                ops.push(if old_field.field_type.is_many_to_many() {
                    Operation::RemoveManyToMany {
                        model: name.to_string(),
                        name: field.name.clone(),
                    }
                } else {
                    Operation::RemoveField {
                        model: name.to_string(),
                        name: field.name.clone(),
                    }
                });
                ops.push(if field.field_type.is_many_to_many() {
                    Operation::AddManyToMany {
                        model: name.to_string(),
                        field: field.clone(),
                    }
                } else {
                    Operation::AddField {
                        model: name.to_string(),
                        field: field.clone(),
                    }
                });
                continue;
            }
            let mut field = field.clone();
            if old_field.null && !field.null && field.default.is_none() {
                if let Some(value) = questioner.ask_not_null_alteration(name, &field.name) {
                    field.default = Some(value);
                }
            }
            ops.push(Operation::AlterField {
                model: name.to_string(),
                field,
            });
        }

        // Option changes.
        ops.extend(diff_indexes(name, &old_model.options.indexes, &new_model.options.indexes));
        if old_model.options.unique_together != new_model.options.unique_together {
            ops.push(Operation::AlterUniqueTogether {
                model: name.to_string(),
                unique_together: new_model.options.unique_together.clone(),
            });
        }
        ops.extend(diff_triggers(
            name,
            &old_model.options.triggers,
            &new_model.options.triggers,
        ));

        // Removals, in the old model's declaration order.
        for field in &old_model.fields {
            if !removed.contains(&field.name) {
                continue;
            }
            ops.push(if field.field_type.is_many_to_many() {
                Operation::RemoveManyToMany {
                    model: name.to_string(),
                    name: field.name.clone(),
                }
            } else {
                Operation::RemoveField {
                    model: name.to_string(),
                    name: field.name.clone(),
                }
            });
        }

        Ok(ops)
    }
}

/// True when two fields differ only by name (and a column that tracked
/// the name on either side).
fn same_field_modulo_name(old: &FieldDef, new: &FieldDef) -> bool {
    let mut old_norm = old.clone();
    let mut new_norm = new.clone();
    if old_norm.column == old_norm.name {
        old_norm.column = String::new();
    }
    if new_norm.column == new_norm.name {
        new_norm.column = String::new();
    }
    old_norm.name = String::new();
    new_norm.name = String::new();
    old_norm == new_norm
}

/// Orders `names` so relation targets come before the models that point
/// at them. Cycles fall back to lexicographic order for the stuck rest.
fn dependency_order(state: &ProjectState, names: &BTreeSet<String>) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in names {
        let Some(model) = state.get_model(name) else {
            continue;
        };
        for field in &model.fields {
            if let Some(target) = field.field_type.relation_target() {
                let target = target.to_lowercase();
                if target != *name {
                    if let Some(key) = names.get(&target) {
                        dependents.entry(key.as_str()).or_default().push(name.as_str());
                        if let Some(d) = indegree.get_mut(name.as_str()) {
                            *d += 1;
                        }
                    }
                }
            }
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut ordered = Vec::new();
    while let Some(name) = ready.first().copied() {
        ready.remove(0);
        ordered.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for dep in deps {
                if let Some(d) = indegree.get_mut(dep) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(dep);
                        ready.sort_unstable();
                    }
                }
            }
        }
    }
    for name in names {
        if !ordered.contains(name) {
            ordered.push(name.clone());
        }
    }
    ordered
}

fn diff_indexes(model: &str, old: &[IndexDef], new: &[IndexDef]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for index in old {
        let survived = new.iter().any(|i| i == index);
        if !survived {
            ops.push(Operation::RemoveIndex {
                model: model.to_string(),
                name: index.name.clone(),
            });
        }
    }
    for index in new {
        let existed = old.iter().any(|i| i == index);
        if !existed {
            ops.push(Operation::AddIndex {
                model: model.to_string(),
                index: index.clone(),
            });
        }
    }
    // A changed definition surfaces as remove-then-add of the same name;
    // keep the drop before the create.
    ops.sort_by_key(|op| matches!(op, Operation::AddIndex { .. }));
    ops
}

fn diff_triggers(model: &str, old: &[TriggerDef], new: &[TriggerDef]) -> Vec<Operation> {
    let mut ops = Vec::new();
    let removed: Vec<String> = old
        .iter()
        .filter(|t| !new.iter().any(|n| n == *t))
        .map(|t| t.name.clone())
        .collect();
    let added: Vec<TriggerDef> = new
        .iter()
        .filter(|t| !old.iter().any(|o| o == *t))
        .cloned()
        .collect();
    if !removed.is_empty() {
        ops.push(Operation::RemoveTriggers {
            model: model.to_string(),
            names: removed,
        });
    }
    if !added.is_empty() {
        ops.push(Operation::AddTriggers {
            model: model.to_string(),
            triggers: added,
        });
    }
    ops
}
