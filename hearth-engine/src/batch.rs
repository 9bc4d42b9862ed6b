use std::future::Future;

use hearth_db::ConnectionPool;
use hearth_model::{Progress, Record, SortField};
use hearth_query::{build_order, build_pagination, build_where};
use tracing::info;

use crate::engine::{RecordEngine, assemble};
use crate::error::EngineResult;
use crate::options::{BatchOptions, BatchSummary};

impl<P: ConnectionPool> RecordEngine<P> {
    /// Walks every matching record in fixed-size pages.
    ///
    /// `process` receives each record with its 0-based position in the whole
    /// walk and is awaited before the next record is handed out; its first
    /// error stops the walk. Pages are ordered by `order_by` (ascending
    /// primary key by default) and the walk ends at the first short page.
    /// `on_progress` is called after each page with the running count.
    pub async fn batch_process<F, Fut>(
        &self,
        options: BatchOptions,
        mut process: F,
        mut on_progress: impl FnMut(Progress) + Send,
    ) -> EngineResult<BatchSummary>
    where
        F: FnMut(Record, u64) -> Fut + Send,
        Fut: Future<Output = EngineResult<()>> + Send,
    {
        let planner = self.planner();
        let table = &self.descriptor().table;
        let batch_size = options.batch_size.max(1);

        let mut params = Vec::new();
        let clause = build_where(
            &options.filters,
            &mut params,
            &planner.where_options(options.include_soft_deleted),
        )?;
        let order = build_order(&options.order_by, &SortField::asc(planner.primary_key()))?;

        let mut summary = BatchSummary::default();
        let mut page = 1;
        loop {
            let sql = assemble(&[
                &format!("SELECT * FROM {table}"),
                &clause,
                &order,
                &build_pagination(page, batch_size),
            ]);
            let rows = self.run(&sql, &params).await?;
            let fetched = rows.len();

            for row in rows {
                process(planner.decode(row), summary.processed).await?;
                summary.processed += 1;
            }
            if fetched > 0 {
                summary.batches += 1;
                on_progress(Progress {
                    processed: summary.processed,
                    total: None,
                });
            }
            if fetched < batch_size as usize {
                break;
            }
            page += 1;
        }

        info!(
            table = %table,
            processed = summary.processed,
            batches = summary.batches,
            "batch processing complete"
        );
        Ok(summary)
    }
}
