//! Store implementations for [`PantryDb`].

use crate::ddl::logical_type;
use crate::model::{Column, Constraint, DataType, ForeignKeyRef, SubtypeTag};
use crate::store::{LayoutRefs, RowStore, StoreResult, SubtypeStore};
use crate::value::{Row, Value};
use async_trait::async_trait;
use datapantry_db::{DbError, DbValue, PantryDb, PhysicalColumnDef};
use std::collections::HashMap;
use std::fmt::Write;

/// Decode a stored value into a cell of the given logical type.
fn decode(value: DbValue, datatype: Option<DataType>) -> Value {
    match (value, datatype) {
        (DbValue::Null, _) => Value::Null,
        (DbValue::Integer(i), Some(DataType::Boolean)) => Value::Bool(i != 0),
        (DbValue::Real(f), Some(DataType::Boolean)) => Value::Bool(f != 0.0),
        (DbValue::Text(s), Some(DataType::Boolean)) => {
            let s = s.trim().to_ascii_lowercase();
            Value::Bool(s == "true" || s == "1")
        }
        (DbValue::Integer(i), _) => Value::Number(i as f64),
        (DbValue::Real(f), _) => Value::Number(f),
        (DbValue::Text(s), _) => Value::Text(s),
        (DbValue::Blob(bytes), _) => Value::Text(bytes.iter().fold(
            String::with_capacity(bytes.len() * 2),
            |mut hex, b| {
                let _ = write!(hex, "{:02x}", b);
                hex
            },
        )),
    }
}

/// Encode a cell for a column of the given logical type.
fn encode(value: &Value, datatype: DataType) -> DbValue {
    match (value, datatype) {
        (Value::Null, _) => DbValue::Null,
        (Value::Bool(b), _) => DbValue::Integer(i64::from(*b)),
        (
            other,
            DataType::String | DataType::Date | DataType::Time | DataType::DateTime,
        ) => DbValue::Text(other.render()),
        // Integral references go in as INTEGER so TEXT and REAL affinities both accept them.
        (Value::Number(n), DataType::ForeignKey) if n.fract() == 0.0 && n.abs() < 9.0e15 => {
            DbValue::Integer(*n as i64)
        }
        (Value::Number(n), _) => DbValue::Real(*n),
        (Value::Text(s), _) => DbValue::Text(s.clone()),
    }
}

/// Name of a table's single primary key column.
async fn primary_key_column(db: &PantryDb, table: &str) -> StoreResult<Option<String>> {
    let info = db.table_info(table).await?;
    let mut keys = info.into_iter().filter(|c| c.primary_key);
    match (keys.next(), keys.next()) {
        (Some(only), None) => Ok(Some(only.name)),
        _ => Ok(None),
    }
}

#[async_trait]
impl RowStore for PantryDb {
    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        PantryDb::list_tables(self).await
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        PantryDb::table_exists(self, table).await
    }

    async fn list_columns(&self, table: &str) -> StoreResult<Vec<Column>> {
        let info = self.table_info(table).await?;
        if info.is_empty() {
            return Err(DbError::not_found(format!("Table not found: {}", table)));
        }
        let foreign_keys = self.foreign_keys(table).await?;
        let unique = self.unique_columns(table).await?;
        let subtypes: HashMap<String, String> = self.semantic_types_for(table).await?;
        let single_primary = info.iter().filter(|c| c.primary_key).count() == 1;

        let mut columns = Vec::with_capacity(info.len());
        for col in &info {
            let reference = foreign_keys.iter().find(|fk| fk.from == col.name);
            let (datatype, foreign_key) = match reference {
                Some(fk) => {
                    let target_column = match &fk.to {
                        Some(to) => to.clone(),
                        None => primary_key_column(self, &fk.table)
                            .await?
                            .unwrap_or_else(|| "id".to_string()),
                    };
                    let target = ForeignKeyRef {
                        target_table: fk.table.clone(),
                        target_column,
                    };
                    (DataType::ForeignKey, Some(target))
                }
                None => {
                    let tag = subtypes.get(&col.name).and_then(|t| SubtypeTag::parse(t));
                    (logical_type(col, tag), None)
                }
            };

            let constraint = if col.primary_key && single_primary {
                Constraint::Primary
            } else if unique.contains(&col.name) {
                Constraint::Unique
            } else {
                Constraint::None
            };

            columns.push(Column {
                name: col.name.clone(),
                datatype,
                constraint,
                is_required: col.not_null,
                foreign_key,
            });
        }
        Ok(columns)
    }

    async fn list_rows(&self, table: &str, columns: &[Column]) -> StoreResult<Vec<Row>> {
        let types: HashMap<&str, DataType> =
            columns.iter().map(|c| (c.name.as_str(), c.datatype)).collect();
        let rows = self.select_all(table).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                row.into_pairs()
                    .map(|(name, value)| {
                        let datatype = types.get(name.as_str()).copied();
                        (name, decode(value, datatype))
                    })
                    .collect()
            })
            .collect())
    }

    async fn count_rows(&self, table: &str) -> StoreResult<u64> {
        let n = PantryDb::count_rows(self, table).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn column_type(&self, table: &str, column: &str) -> StoreResult<Option<String>> {
        self.column_declared_type(table, column).await
    }

    async fn distinct_values(&self, table: &str, column: &str) -> StoreResult<Vec<Value>> {
        let values = PantryDb::distinct_values(self, table, column).await?;
        Ok(values.into_iter().map(|v| decode(v, None)).collect())
    }

    async fn create_table(&self, name: &str, columns: &[PhysicalColumnDef]) -> StoreResult<()> {
        PantryDb::create_table(self, name, columns).await
    }

    async fn bulk_insert(&self, table: &str, columns: &[Column], rows: &[Row]) -> StoreResult<u64> {
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let encoded: Vec<Vec<DbValue>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(&c.name).map_or(DbValue::Null, |v| encode(v, c.datatype)))
                    .collect()
            })
            .collect();
        PantryDb::bulk_insert(self, table, &names, &encoded).await
    }

    async fn drop_table(&self, name: &str) -> StoreResult<()> {
        PantryDb::drop_table(self, name).await
    }

    async fn rename_table(&self, from: &str, to: &str) -> StoreResult<()> {
        PantryDb::rename_table(self, from, to).await
    }

    async fn replace_table(&self, original: &str, shadow: &str, final_name: &str) -> StoreResult<()> {
        PantryDb::replace_table(self, original, shadow, final_name).await
    }
}

#[async_trait]
impl SubtypeStore for PantryDb {
    async fn get_subtype(&self, table: &str, column: &str) -> StoreResult<Option<SubtypeTag>> {
        let tag = self.semantic_type(table, column).await?;
        Ok(tag.as_deref().and_then(SubtypeTag::parse))
    }

    async fn set_subtype(&self, table: &str, column: &str, tag: SubtypeTag) -> StoreResult<()> {
        self.set_semantic_type(table, column, tag.as_str()).await
    }

    async fn clear_subtype(&self, table: &str, column: &str) -> StoreResult<()> {
        self.clear_semantic_type(table, column).await
    }

    async fn clear_table_subtypes(&self, table: &str) -> StoreResult<()> {
        self.clear_semantic_types_for(table).await?;
        Ok(())
    }
}

#[async_trait]
impl LayoutRefs for PantryDb {
    async fn rename_references(&self, from: &str, to: &str) -> StoreResult<()> {
        self.rename_position(from, to).await?;
        Ok(())
    }

    async fn delete_references(&self, table: &str) -> StoreResult<()> {
        self.delete_position(table).await?;
        Ok(())
    }
}
