//! Derive diff operations from two column lists.

use crate::error::MigrationError;
use crate::model::{Column, DiffOp};
use std::collections::{HashMap, HashSet};

/// Compute the operations that turn `old` into `new`.
///
/// Renames cannot be inferred from names alone, so the caller declares them as
/// `(old_name, new_name)` pairs. Output order is Delete, Rename, Retype, Add,
/// ConstraintChange, RequiredChange; within a kind, columns follow the order of
/// the list they come from.
pub fn diff_columns(
    old: &[Column],
    new: &[Column],
    renames: &[(String, String)],
) -> Result<Vec<DiffOp>, MigrationError> {
    let old_names: HashSet<&str> = old.iter().map(|c| c.name.as_str()).collect();
    let new_names: HashSet<&str> = new.iter().map(|c| c.name.as_str()).collect();

    let mut renamed_to: HashMap<&str, &str> = HashMap::new();
    let mut rename_targets: HashSet<&str> = HashSet::new();
    for (from, to) in renames {
        if from == to {
            continue;
        }
        if !old_names.contains(from.as_str()) {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "rename source '{}' is not an existing column",
                from
            )));
        }
        if !new_names.contains(to.as_str()) {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "rename target '{}' is not in the new column list",
                to
            )));
        }
        if old_names.contains(to.as_str()) {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "rename target '{}' collides with an existing column",
                to
            )));
        }
        if renamed_to.insert(from.as_str(), to.as_str()).is_some()
            || !rename_targets.insert(to.as_str())
        {
            return Err(MigrationError::InvalidColumnSpec(format!(
                "column '{}' is renamed more than once",
                from
            )));
        }
    }

    let mut deletes = Vec::new();
    let mut rename_ops = Vec::new();
    let mut retypes = Vec::new();
    let mut adds = Vec::new();
    let mut constraints = Vec::new();
    let mut required = Vec::new();

    let new_by_name: HashMap<&str, &Column> = new.iter().map(|c| (c.name.as_str(), c)).collect();

    for old_col in old {
        let target = match renamed_to.get(old_col.name.as_str()) {
            Some(to) => {
                rename_ops.push(DiffOp::Rename {
                    from: old_col.name.clone(),
                    to: (*to).to_string(),
                });
                *to
            }
            None => old_col.name.as_str(),
        };

        let Some(new_col) = new_by_name.get(target) else {
            deletes.push(DiffOp::Delete {
                name: old_col.name.clone(),
            });
            continue;
        };

        if old_col.datatype != new_col.datatype {
            retypes.push(DiffOp::Retype {
                name: new_col.name.clone(),
                from: old_col.datatype,
                to: new_col.datatype,
            });
        }
        if old_col.constraint != new_col.constraint {
            constraints.push(DiffOp::ConstraintChange {
                name: new_col.name.clone(),
                constraint: new_col.constraint,
            });
        }
        if old_col.is_required != new_col.is_required {
            required.push(DiffOp::RequiredChange {
                name: new_col.name.clone(),
                is_required: new_col.is_required,
            });
        }
    }

    for new_col in new {
        let name = new_col.name.as_str();
        if old_names.contains(name) || rename_targets.contains(name) {
            continue;
        }
        adds.push(DiffOp::Add {
            name: new_col.name.clone(),
            datatype: new_col.datatype,
            is_required: new_col.is_required,
        });
    }

    Ok(deletes
        .into_iter()
        .chain(rename_ops)
        .chain(retypes)
        .chain(adds)
        .chain(constraints)
        .chain(required)
        .collect())
}
