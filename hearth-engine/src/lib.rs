//! Schema-aware record engine for the Hearth backend.
//!
//! One [`RecordEngine`] serves one entity (table). It provides:
//! - reads by key, by filter and paged with a total count
//! - create/update/delete with schema validation, soft delete and restore
//! - bulk insert in batches and filter-scoped bulk update
//! - aggregates (`count`, `sum`, `average`, `min`, `max`)
//! - transactions on a single borrowed connection
//! - a batch processor that walks a whole table page by page
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hearth_db::SqlitePool;
//! use hearth_engine::{FindOptions, QueryOptions, RecordEngine};
//! use hearth_model::{EntityDescriptor, Filters};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(SqlitePool::open("hearth.db", 4)?);
//! let descriptor = EntityDescriptor::new("donations").with_soft_delete(true);
//! let donations = RecordEngine::open(pool, descriptor).await?;
//!
//! let mut data = serde_json::Map::new();
//! data.insert("donor".into(), json!("Amina"));
//! data.insert("amount".into(), json!(250));
//! let created = donations.create(data).await?;
//!
//! let page = donations
//!     .find_all(&Filters::new().eq("donor", "Amina"), &FindOptions::default())
//!     .await?;
//! assert_eq!(page.pagination.total, 1);
//!
//! let total = donations.sum("amount", &Filters::new(), &QueryOptions::default()).await?;
//! # let _ = (created, total);
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod batch;
mod bulk;
mod catalog;
mod engine;
mod error;
mod observer;
mod options;
mod planner;
mod relation;
mod retry;
mod transaction;

pub use catalog::SchemaCatalog;
pub use engine::{EngineCache, RecordEngine};
pub use error::{EngineError, EngineResult};
pub use observer::RecordObserver;
pub use options::{
    BatchOptions, BatchSummary, BulkInsertResult, BulkOptions, DEFAULT_BATCH_SIZE,
    DEFAULT_PAGE_LIMIT, DeleteMode, FindOptions, QueryOptions,
};
pub use relation::{Relation, RelationKind};
pub use retry::RetryPolicy;
pub use transaction::Transaction;
