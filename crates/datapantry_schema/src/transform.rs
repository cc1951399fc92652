//! Row transformation for a migration.
//!
//! [`RowTransformer`] rewrites an in-memory snapshot of a table's rows so that
//! they fit the new column list. It runs four passes in a fixed order:
//!
//! 1. **Rewrite**: per row, apply Delete, Rename, Retype and Add (always in that
//!    order, whatever order the ops arrive in), then conform the key set to the
//!    new columns.
//! 2. **Constraint repair**: make newly keyed columns distinct. Strings get
//!    `_1`, `_2`, ... suffixes, numbers are renumbered from 1, and every other
//!    type keeps the first occurrence and nulls later duplicates. A column that
//!    was already keyed and only changes type keeps its values; only values
//!    that collide after coercion are repaired.
//! 3. **Required repair**: fill empty cells of newly required columns with a
//!    synthetic default, distinct per row when the column is keyed. Required
//!    references are left null and reported, as are keyed cells for which no
//!    distinct value is left.
//! 4. **Reference check**: null every foreign key value missing from the
//!    referenced column.
//!
//! The transformer does no I/O. Referenced values are fetched by the caller and
//! passed in as [`ReferenceSets`].

use crate::coerce::{coerce, default_for, distinct_default, required_default};
use crate::model::{Column, DataType, DiffOp};
use crate::value::{format_number, Row, Value};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// What pass 4 knows about the values one foreign key column may hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceValues {
    /// Distinct non-null values of the referenced column, as comparison keys.
    Known(HashSet<String>),
    /// The reference points into the table being migrated; resolved from the
    /// transformed rows themselves.
    SameTable { column: String },
    /// The referenced table or column could not be read.
    Unreadable,
}

impl ReferenceValues {
    pub fn from_values<'v>(values: impl IntoIterator<Item = &'v Value>) -> Self {
        ReferenceValues::Known(values.into_iter().filter_map(Value::key).collect())
    }
}

/// Reference sets keyed by foreign key column name.
pub type ReferenceSets = HashMap<String, ReferenceValues>;

/// Why foreign key values were nulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NullReason {
    /// Later duplicate in a newly keyed column.
    DuplicateValue,
    /// Value not present in the referenced column.
    DanglingReference,
    /// Referenced table or column unreadable; every value was nulled.
    UnreadableReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NulledReferences {
    pub column: String,
    pub reason: NullReason,
    pub count: usize,
}

/// A required foreign key column that still holds nulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingReference {
    pub column: String,
    pub rows: usize,
}

/// A required keyed column whose type ran out of distinct synthetic values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhaustedColumn {
    pub column: String,
    pub rows: usize,
}

/// Lossy outcomes of a transform.
///
/// Only `missing_required_references` and `exhausted_required` leave rows that
/// the new columns cannot hold; the caller decides whether to reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    pub rows: usize,
    pub nulled_references: Vec<NulledReferences>,
    pub missing_required_references: Vec<MissingReference>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exhausted_required: Vec<ExhaustedColumn>,
}

impl TransformReport {
    /// Whether any foreign key value was nulled.
    pub fn referential_integrity_degraded(&self) -> bool {
        self.nulled_references.iter().any(|n| n.count > 0)
    }

    fn record_nulled(&mut self, column: &str, reason: NullReason, count: usize) {
        if count == 0 {
            return;
        }
        warn!(column, ?reason, count, "Foreign key values nulled");
        self.nulled_references.push(NulledReferences {
            column: column.to_string(),
            reason,
            count,
        });
    }
}

/// Applies one migration's diff operations to a row set.
#[derive(Debug, Clone, Copy)]
pub struct RowTransformer<'a> {
    columns: &'a [Column],
    ops: &'a [DiffOp],
}

impl<'a> RowTransformer<'a> {
    pub fn new(columns: &'a [Column], ops: &'a [DiffOp]) -> Self {
        Self { columns, ops }
    }

    /// Run all four passes.
    pub fn transform(&self, rows: Vec<Row>, references: &ReferenceSets) -> (Vec<Row>, TransformReport) {
        let mut report = TransformReport {
            rows: rows.len(),
            ..TransformReport::default()
        };

        let mut rows: Vec<Row> = rows.into_iter().map(|row| self.rewrite_row(row)).collect();
        debug!(rows = rows.len(), "Rewrite pass complete");

        for column in self.constraint_targets() {
            self.repair_uniqueness(&mut rows, column, &mut report);
        }
        for column in self.retyped_keys() {
            self.repair_collisions(&mut rows, column, &mut report);
        }
        debug!("Constraint repair pass complete");

        for column in self.required_targets() {
            let unfilled = repair_required(&mut rows, column);
            if unfilled > 0 {
                warn!(column = %column.name, unfilled, "No distinct default left");
                report.exhausted_required.push(ExhaustedColumn {
                    column: column.name.clone(),
                    rows: unfilled,
                });
            }
        }
        debug!("Required repair pass complete");

        self.check_references(&mut rows, references, &mut report);
        debug!(
            degraded = report.referential_integrity_degraded(),
            "Reference check pass complete"
        );

        (rows, report)
    }

    /// Pass 1 for a single row.
    pub fn rewrite_row(&self, mut row: Row) -> Row {
        for op in self.ops {
            if let DiffOp::Delete { name } = op {
                row.remove(name);
            }
        }
        for op in self.ops {
            if let DiffOp::Rename { from, to } = op {
                if let Some(value) = row.remove(from) {
                    row.insert(to.clone(), value);
                }
            }
        }
        for op in self.ops {
            if let DiffOp::Retype { name, from, to } = op {
                if let Some(value) = row.get(name) {
                    let coerced = coerce(value, *from, *to);
                    row.insert(name.clone(), coerced);
                }
            }
        }
        for op in self.ops {
            if let DiffOp::Add { name, datatype, .. } = op {
                if !row.contains_key(name) {
                    row.insert(name.clone(), default_for(*datatype));
                }
            }
        }

        row.conform(self.columns.iter().map(|c| c.name.as_str()), |name| {
            self.column(name)
                .map_or(Value::Null, |c| default_for(c.datatype))
        });
        row
    }

    /// Columns that become primary or unique in this migration.
    pub fn constraint_targets(&self) -> Vec<&'a Column> {
        self.targets(|op, column| match op {
            DiffOp::ConstraintChange { constraint, .. } => constraint.is_keyed(),
            DiffOp::Add { .. } => column.constraint.is_keyed(),
            _ => false,
        })
    }

    /// Keyed columns that only change type. Coercion may make their values collide.
    pub fn retyped_keys(&self) -> Vec<&'a Column> {
        let newly: HashSet<&str> = self
            .constraint_targets()
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        self.targets(|op, column| {
            matches!(op, DiffOp::Retype { .. })
                && column.constraint.is_keyed()
                && !newly.contains(column.name.as_str())
        })
    }

    /// Columns that become required in this migration.
    ///
    /// Retyped required columns are included since coercion can produce nulls,
    /// and so are required columns whose constraint repair nulled or skipped cells.
    pub fn required_targets(&self) -> Vec<&'a Column> {
        let keyed: HashSet<&str> = self
            .constraint_targets()
            .into_iter()
            .chain(self.retyped_keys())
            .map(|c| c.name.as_str())
            .collect();
        self.targets(|op, column| match op {
            DiffOp::RequiredChange { is_required, .. } => *is_required,
            DiffOp::Add { .. } | DiffOp::Retype { .. } => column.is_required,
            DiffOp::ConstraintChange { name, .. } => {
                column.is_required && keyed.contains(name.as_str())
            }
            _ => false,
        })
    }

    fn column(&self, name: &str) -> Option<&'a Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// New columns named by at least one op matching `pred`, in column order.
    fn targets<F>(&self, pred: F) -> Vec<&'a Column>
    where
        F: Fn(&DiffOp, &Column) -> bool,
    {
        let named: HashSet<&str> = self
            .ops
            .iter()
            .filter_map(|op| {
                let name = op_column(op)?;
                let column = self.column(name)?;
                pred(op, column).then_some(name)
            })
            .collect();
        self.columns
            .iter()
            .filter(|c| named.contains(c.name.as_str()))
            .collect()
    }

    fn repair_uniqueness(&self, rows: &mut [Row], column: &Column, report: &mut TransformReport) {
        let name = column.name.as_str();
        match column.datatype {
            DataType::String => suffix_duplicates(rows, name, column.is_required),
            DataType::Number => renumber(rows, name),
            DataType::ForeignKey => {
                let nulled = null_later_duplicates(rows, name);
                report.record_nulled(name, NullReason::DuplicateValue, nulled);
            }
            DataType::Boolean | DataType::Date | DataType::Time | DataType::DateTime => {
                let nulled = null_later_duplicates(rows, name);
                if nulled > 0 {
                    warn!(column = name, nulled, "Duplicate values nulled");
                }
            }
        }
    }

    /// Repair a column that was already keyed: the first occurrence of a value
    /// stays, later duplicates change.
    fn repair_collisions(&self, rows: &mut [Row], column: &Column, report: &mut TransformReport) {
        match column.datatype {
            DataType::Number => {
                let moved = renumber_collisions(rows, &column.name);
                if moved > 0 {
                    warn!(column = %column.name, moved, "Colliding numbers renumbered");
                }
            }
            _ => self.repair_uniqueness(rows, column, report),
        }
    }

    fn check_references(&self, rows: &mut [Row], references: &ReferenceSets, report: &mut TransformReport) {
        for column in self.columns.iter().filter(|c| c.datatype == DataType::ForeignKey) {
            let name = column.name.as_str();
            let resolved = match references.get(name) {
                Some(ReferenceValues::Known(keys)) => Some(keys.clone()),
                Some(ReferenceValues::SameTable { column: target }) => Some(
                    rows.iter()
                        .filter_map(|row| row.get(target).and_then(Value::key))
                        .collect(),
                ),
                Some(ReferenceValues::Unreadable) | None => None,
            };

            let mut nulled = 0;
            for row in rows.iter_mut() {
                let Some(key) = row.get(name).and_then(Value::key) else {
                    continue;
                };
                let keep = resolved.as_ref().is_some_and(|keys| keys.contains(&key));
                if !keep {
                    row.insert(name, Value::Null);
                    nulled += 1;
                }
            }
            let reason = if resolved.is_some() {
                NullReason::DanglingReference
            } else {
                NullReason::UnreadableReference
            };
            report.record_nulled(name, reason, nulled);

            if column.is_required {
                let missing = rows
                    .iter()
                    .filter(|row| row.get(name).map_or(true, Value::is_null))
                    .count();
                if missing > 0 {
                    report.missing_required_references.push(MissingReference {
                        column: name.to_string(),
                        rows: missing,
                    });
                }
            }
        }
    }
}

fn op_column(op: &DiffOp) -> Option<&str> {
    match op {
        DiffOp::Delete { .. } | DiffOp::Rename { .. } => None,
        DiffOp::Retype { name, .. }
        | DiffOp::Add { name, .. }
        | DiffOp::ConstraintChange { name, .. }
        | DiffOp::RequiredChange { name, .. } => Some(name),
    }
}

/// Every occurrence of a duplicated string gets `_N`, the first one included.
fn suffix_duplicates(rows: &mut [Row], column: &str, skip_empty: bool) {
    let eligible = |value: &Value| !(skip_empty && value.is_empty());

    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in rows.iter().filter_map(|row| row.get(column)) {
        if let Some(key) = value.key().filter(|_| eligible(value)) {
            *counts.entry(key).or_default() += 1;
        }
    }

    let mut taken: HashSet<String> = counts
        .iter()
        .filter(|(_, n)| **n == 1)
        .map(|(key, _)| key.clone())
        .collect();
    let mut next: HashMap<String, usize> = HashMap::new();

    for row in rows.iter_mut() {
        let Some(value) = row.get(column) else {
            continue;
        };
        if !eligible(value) {
            continue;
        }
        let Some(key) = value.key() else {
            continue;
        };
        if counts.get(&key).copied().unwrap_or(0) < 2 {
            continue;
        }
        let counter = next.entry(key.clone()).or_insert(0);
        let candidate = loop {
            *counter += 1;
            let candidate = format!("{}_{}", key, counter);
            if taken.insert(candidate.clone()) {
                break candidate;
            }
        };
        row.insert(column, Value::Text(candidate));
    }
}

/// Non-null numbers become 1, 2, 3, ... in row order.
fn renumber(rows: &mut [Row], column: &str) {
    let mut next = 0.0;
    for row in rows.iter_mut() {
        if row.get(column).is_some_and(|v| !v.is_null()) {
            next += 1.0;
            row.insert(column, Value::Number(next));
        }
    }
}

/// Later duplicates take the lowest integer from 1 not already in the column.
/// Returns how many values changed.
fn renumber_collisions(rows: &mut [Row], column: &str) -> usize {
    let mut taken: HashSet<String> = rows
        .iter()
        .filter_map(|row| row.get(column).and_then(Value::key))
        .collect();
    let mut seen = HashSet::new();
    let mut counter = 0.0;
    let mut moved = 0;
    for row in rows.iter_mut() {
        let Some(key) = row.get(column).and_then(Value::key) else {
            continue;
        };
        if seen.insert(key) {
            continue;
        }
        let candidate = loop {
            counter += 1.0;
            if taken.insert(format_number(counter)) {
                break counter;
            }
        };
        row.insert(column, Value::Number(candidate));
        moved += 1;
    }
    moved
}

/// Keep the first occurrence of each value; null the rest. Returns the nulled count.
fn null_later_duplicates(rows: &mut [Row], column: &str) -> usize {
    let mut seen = HashSet::new();
    let mut nulled = 0;
    for row in rows.iter_mut() {
        let Some(key) = row.get(column).and_then(Value::key) else {
            continue;
        };
        if !seen.insert(key) {
            row.insert(column, Value::Null);
            nulled += 1;
        }
    }
    nulled
}

/// Fill empty cells of a required column. Returns how many cells could not be
/// given a distinct value.
fn repair_required(rows: &mut [Row], column: &Column) -> usize {
    let name = column.name.as_str();
    let Some(fallback) = required_default(column.datatype) else {
        // references are never fabricated
        return 0;
    };
    let keyed = column.constraint.is_keyed();

    let mut taken: HashSet<String> = rows
        .iter()
        .filter_map(|row| row.get(name))
        .filter(|v| !v.is_empty())
        .filter_map(Value::key)
        .collect();
    let mut next: u64 = 0;
    let mut filled = 0;
    let mut unfilled = 0;

    for row in rows.iter_mut() {
        if !row.get(name).map_or(true, Value::is_empty) {
            continue;
        }
        let value = if keyed {
            match next_distinct(column.datatype, &mut next, &mut taken) {
                Some(value) => value,
                None => {
                    unfilled += 1;
                    continue;
                }
            }
        } else {
            fallback.clone()
        };
        row.insert(name, value);
        filled += 1;
    }

    if filled > 0 {
        debug!(column = name, filled, "Required defaults assigned");
    }
    unfilled
}

/// Next synthetic value not already in `taken`.
fn next_distinct(datatype: DataType, next: &mut u64, taken: &mut HashSet<String>) -> Option<Value> {
    loop {
        let candidate = distinct_default(datatype, *next)?;
        *next += 1;
        if candidate.key().is_some_and(|key| taken.insert(key)) {
            return Some(candidate);
        }
    }
}
