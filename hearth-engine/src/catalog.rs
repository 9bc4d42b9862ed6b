//! Column metadata introspection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use hearth_db::Executor;
use hearth_model::{ColumnSchema, TableSchema};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};

const COLUMNS_SQL: &str =
    "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";

const UNIQUE_INDEX_SQL: &str = "SELECT il.name AS index_name, ii.name AS column_name \
     FROM pragma_index_list(?) AS il, pragma_index_info(il.name) AS ii \
     WHERE il.\"unique\" = 1";

/// Holds the introspected schema of one table.
///
/// The snapshot is taken once when the engine is opened and replaced only by
/// [`SchemaCatalog::refresh`]. A table that could not be introspected leaves
/// the catalog empty, and the engine skips validation for it.
#[derive(Debug)]
pub struct SchemaCatalog {
    table: String,
    snapshot: RwLock<Option<Arc<TableSchema>>>,
}

impl SchemaCatalog {
    /// Introspects `table`, degrading to an empty catalog on failure.
    pub async fn load<E: Executor + ?Sized>(executor: &E, table: &str) -> Self {
        let snapshot = match Self::introspect(executor, table).await {
            Ok(schema) => {
                info!(table = %table, columns = schema.len(), "loaded table schema");
                Some(Arc::new(schema))
            }
            Err(e) => {
                warn!(table = %table, "running without schema validation: {e}");
                None
            }
        };
        Self {
            table: table.to_string(),
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Reads column and unique-index metadata of `table`.
    ///
    /// Fails with [`EngineError::SchemaUnavailable`] when the table reports no
    /// columns or the metadata queries fail.
    pub async fn introspect<E: Executor + ?Sized>(
        executor: &E,
        table: &str,
    ) -> EngineResult<TableSchema> {
        let unavailable = |reason: String| EngineError::SchemaUnavailable(format!("{table}: {reason}"));
        let name = [Value::String(table.to_string())];

        let rows = executor
            .execute(COLUMNS_SQL, &name)
            .await
            .map_err(|e| unavailable(e.message))?;
        if rows.is_empty() {
            return Err(unavailable("table has no columns".into()));
        }

        let index_rows = executor
            .execute(UNIQUE_INDEX_SQL, &name)
            .await
            .map_err(|e| unavailable(e.message))?;
        let unique = single_column_unique(&index_rows);

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let Some(column_name) = row.get("name").and_then(Value::as_str) else {
                continue;
            };
            let declared = row.get("type").and_then(Value::as_str).unwrap_or_default();
            let mut column = ColumnSchema::from_declared(column_name, declared);

            if row.get("notnull").and_then(Value::as_i64).unwrap_or(0) != 0 {
                column = column.not_null();
            }
            if row.get("pk").and_then(Value::as_i64).unwrap_or(0) != 0 {
                column = column.primary_key();
            }
            if unique.contains(column_name) {
                column = column.unique();
            }
            if let Some(default) = row.get("dflt_value").and_then(Value::as_str) {
                column = column.default_value(default);
            }
            columns.push(column);
        }

        Ok(TableSchema::new(table, columns))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The current snapshot, if the table could be introspected.
    pub fn schema(&self) -> Option<Arc<TableSchema>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_available(&self) -> bool {
        self.schema().is_some()
    }

    /// Re-introspects the table and replaces the snapshot. On failure the
    /// previous snapshot is kept.
    pub async fn refresh<E: Executor + ?Sized>(
        &self,
        executor: &E,
    ) -> EngineResult<Arc<TableSchema>> {
        let schema = Arc::new(Self::introspect(executor, &self.table).await?);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(schema.clone());
        info!(table = %self.table, columns = schema.len(), "refreshed table schema");
        Ok(schema)
    }
}

/// Columns covered by a unique index on that column alone.
fn single_column_unique(rows: &[hearth_db::Row]) -> HashSet<String> {
    let mut by_index: HashMap<&str, Vec<&str>> = HashMap::new();
    for row in rows {
        if let (Some(index), Some(column)) = (
            row.get("index_name").and_then(Value::as_str),
            row.get("column_name").and_then(Value::as_str),
        ) {
            by_index.entry(index).or_default().push(column);
        }
    }
    by_index
        .into_values()
        .filter(|columns| columns.len() == 1)
        .flat_map(|columns| columns.into_iter().map(str::to_string))
        .collect()
}
