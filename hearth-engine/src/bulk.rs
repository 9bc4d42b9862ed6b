use hearth_db::ConnectionPool;
use hearth_model::{Filters, Progress, Record, ValidationMode};
use hearth_query::build_insert;
use serde_json::Value;
use tracing::{debug, info};

use crate::engine::RecordEngine;
use crate::error::EngineResult;
use crate::options::{BulkInsertResult, BulkOptions, QueryOptions};

/// Bound parameters SQLite accepts in one statement.
const MAX_SQL_VARIABLES: usize = 32_766;

impl<P: ConnectionPool> RecordEngine<P> {
    /// Inserts `records` in batches of multi-row INSERTs.
    ///
    /// Every record is validated before anything is written. Batches are
    /// committed independently: a failing batch leaves the earlier ones in
    /// place. `on_progress` is called once per batch with the running count.
    pub async fn create_many(
        &self,
        records: Vec<Record>,
        options: BulkOptions,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> EngineResult<BulkInsertResult> {
        let planner = self.planner();
        let table = &self.descriptor().table;
        let total = records.len();
        if total == 0 {
            return Ok(BulkInsertResult::default());
        }

        planner.validate_all(&records, ValidationMode::Create)?;

        let max = self.descriptor().max_bulk_batch_size.max(1);
        let batch_size = options.batch_size.unwrap_or(max).clamp(1, max);
        let prepared: Vec<Record> = records
            .into_iter()
            .map(|r| planner.prepare_insert(r))
            .collect();

        let mut result = BulkInsertResult::default();
        for (batch_no, batch) in prepared.chunks(batch_size).enumerate() {
            // Rows of one INSERT must share a column list.
            for same_columns in batch.chunk_by(|a, b| a.keys().eq(b.keys())) {
                let Some(first) = same_columns.first() else {
                    continue;
                };
                let columns: Vec<String> = first.keys().cloned().collect();
                let rows_per_statement = (MAX_SQL_VARIABLES / columns.len().max(1)).max(1);

                for group in same_columns.chunks(rows_per_statement) {
                    let sql =
                        build_insert(table, &columns, group.len(), Some(planner.primary_key()))?;
                    let params: Vec<Value> =
                        group.iter().flat_map(|r| r.values().cloned()).collect();

                    let rows = self.run(&sql, &params).await?;
                    for (i, record) in group.iter().enumerate() {
                        let id = rows
                            .get(i)
                            .and_then(|row| row.get(planner.primary_key()))
                            .or_else(|| record.get(planner.primary_key()))
                            .cloned()
                            .unwrap_or(Value::Null);
                        result.inserted_ids.push(id);
                    }
                    result.inserted_count += group.len();
                }
            }
            self.invalidate_cache();

            debug!(table = %table, batch = batch_no + 1, rows = batch.len(), "inserted batch");
            on_progress(Progress {
                processed: result.inserted_count as u64,
                total: Some(total as u64),
            });
        }

        info!(table = %table, inserted = result.inserted_count, "bulk insert complete");
        Ok(result)
    }

    /// Applies `data` to every record matching `filters`, returning the
    /// number of rows changed.
    pub async fn update_many(
        &self,
        filters: &Filters,
        data: Record,
        options: &QueryOptions,
    ) -> EngineResult<u64> {
        let planner = self.planner();
        planner.validate(&data, ValidationMode::Update)?;
        let changes = planner.prepare_update(data);
        if changes.is_empty() {
            return Ok(0);
        }

        let (sql, params) = planner.update_where(filters, &changes, options.include_soft_deleted)?;
        let affected = self.run(&sql, &params).await?.len() as u64;
        self.invalidate_cache();

        debug!(table = %self.descriptor().table, affected, "updated records");
        Ok(affected)
    }
}
