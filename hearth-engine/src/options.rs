use hearth_model::{Filters, Join, SortField};
use hearth_query::RawCondition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size of [`FindOptions`].
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Default page size of [`BatchOptions`].
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Options for single-record reads, existence checks, aggregates and
/// updates addressed by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub include_soft_deleted: bool,
    pub use_cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            include_soft_deleted: false,
            use_cache: true,
        }
    }
}

impl QueryOptions {
    /// Sees soft-deleted rows too.
    pub fn including_deleted() -> Self {
        Self {
            include_soft_deleted: true,
            ..Self::default()
        }
    }

    /// Always goes to the store.
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }
}

/// Options for [`crate::RecordEngine::find_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    /// 1-based page number; 0 is treated as 1.
    pub page: u32,
    pub limit: u32,
    /// Empty means the entity's default order.
    pub sort: Vec<SortField>,
    pub include_soft_deleted: bool,
    /// Projection; empty selects every column.
    pub fields: Vec<String>,
    pub joins: Vec<Join>,
    pub group_by: Vec<String>,
    pub having: Option<RawCondition>,
    pub use_cache: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort: Vec::new(),
            include_soft_deleted: false,
            fields: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: None,
            use_cache: true,
        }
    }
}

impl FindOptions {
    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn with_group_by<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_having(mut self, having: RawCondition) -> Self {
        self.having = Some(having);
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_soft_deleted = true;
        self
    }

    pub fn uncached(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Options for [`crate::RecordEngine::create_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkOptions {
    /// Rows per INSERT, capped at the descriptor's `max_bulk_batch_size`.
    pub batch_size: Option<usize>,
}

impl BulkOptions {
    pub fn batch_size(size: usize) -> Self {
        Self {
            batch_size: Some(size),
        }
    }
}

/// Options for [`crate::RecordEngine::batch_process`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub batch_size: u32,
    pub filters: Filters,
    /// Empty means ascending primary key.
    pub order_by: Vec<SortField>,
    pub include_soft_deleted: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            filters: Filters::new(),
            order_by: Vec::new(),
            include_soft_deleted: false,
        }
    }
}

/// How a record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// Stamp the deletion marker and keep the row.
    #[default]
    Soft,
    /// Physically remove the row.
    Hard,
}

/// Outcome of [`crate::RecordEngine::create_many`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkInsertResult {
    pub inserted_count: usize,
    pub inserted_ids: Vec<Value>,
}

/// Outcome of [`crate::RecordEngine::batch_process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: u64,
    pub batches: u64,
}
