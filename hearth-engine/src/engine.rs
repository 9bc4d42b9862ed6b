//! The record engine: schema-aware CRUD over one table.

use std::sync::Arc;
use std::time::Duration;

use hearth_cache::{ResultCache, entity_prefix, identity_key, query_key};
use hearth_db::{ConnectionPool, Row, StoreError};
use hearth_model::{
    DELETED_AT, EntityDescriptor, Filters, PageInfo, PaginationResult, Record, TableSchema,
    ValidationMode,
};
use hearth_query::{
    WhereOptions, build_group_by, build_having, build_joins, build_order, build_pagination,
    build_select_list, build_where, check_identifier,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::catalog::SchemaCatalog;
use crate::error::{EngineError, EngineResult};
use crate::observer::RecordObserver;
use crate::options::{DeleteMode, FindOptions, QueryOptions};
use crate::planner::{Planner, id_text, returned_key};
use crate::retry::RetryPolicy;

/// Cache shared by the reads of an engine: identity entries hold one record,
/// query entries hold an array of rows.
pub type EngineCache = ResultCache<Value>;

/// Joins non-empty SQL fragments with single spaces.
pub(crate) fn assemble(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generic record access for one entity.
///
/// Built from an [`EntityDescriptor`] and a connection pool. The table
/// schema is introspected once at [`RecordEngine::open`]; when that fails the
/// engine keeps working without validation or structured-column decoding.
///
/// Every write invalidates all cache entries of the entity (identity and
/// query entries alike).
pub struct RecordEngine<P: ConnectionPool> {
    pool: Arc<P>,
    descriptor: EntityDescriptor,
    catalog: SchemaCatalog,
    cache: Arc<EngineCache>,
    sweeper: Option<JoinHandle<()>>,
    observers: Vec<Arc<dyn RecordObserver>>,
    retry: RetryPolicy,
}

impl<P: ConnectionPool> RecordEngine<P> {
    /// Opens an engine for `descriptor`, loading the table schema and
    /// starting the cache sweeper. Must be called within a tokio runtime.
    pub async fn open(pool: Arc<P>, descriptor: EntityDescriptor) -> EngineResult<Self> {
        for name in [&descriptor.table, &descriptor.primary_key] {
            check_identifier(name)
                .map_err(|e| EngineError::Config(format!("invalid descriptor: {e}")))?;
        }

        let catalog = SchemaCatalog::load(pool.as_ref(), &descriptor.table).await;

        let cache = Arc::new(if descriptor.cache_enabled {
            EngineCache::new(Duration::from_secs(descriptor.cache_ttl_secs))
        } else {
            EngineCache::disabled()
        });
        let sweeper =
            cache.spawn_sweeper(Duration::from_secs(descriptor.cache_sweep_interval_secs));

        info!(
            table = %descriptor.table,
            soft_delete = descriptor.soft_delete,
            cache = descriptor.cache_enabled,
            validated = catalog.is_available(),
            "record engine ready"
        );

        Ok(Self {
            retry: RetryPolicy::from_descriptor(&descriptor),
            pool,
            descriptor,
            catalog,
            cache,
            sweeper,
            observers: Vec::new(),
        })
    }

    /// Replaces the engine's own cache with a shared one. The caller is
    /// responsible for sweeping it.
    pub fn with_cache(mut self, cache: Arc<EngineCache>) -> Self {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
        self.cache = cache;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RecordObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> Option<Arc<TableSchema>> {
        self.catalog.schema()
    }

    pub fn cache(&self) -> &Arc<EngineCache> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    /// Re-introspects the table schema.
    pub async fn refresh_schema(&self) -> EngineResult<Arc<TableSchema>> {
        let schema = self.catalog.refresh(self.pool.as_ref()).await?;
        self.invalidate_cache();
        Ok(schema)
    }

    pub(crate) fn planner(&self) -> Planner<'_> {
        Planner::new(&self.descriptor, self.catalog.schema())
    }

    pub(crate) fn observers(&self) -> &[Arc<dyn RecordObserver>] {
        &self.observers
    }

    /// Drops every cache entry of this entity.
    pub(crate) fn invalidate_cache(&self) {
        let removed = self
            .cache
            .invalidate(Some(&entity_prefix(&self.descriptor.table)));
        if removed > 0 {
            debug!(table = %self.descriptor.table, removed, "invalidated cache entries");
        }
    }

    // ── Execution ────────────────────────────────────────────────

    /// Runs one statement on the pool, retrying per the entity's policy.
    pub(crate) async fn run(&self, sql: &str, params: &[Value]) -> EngineResult<Vec<Row>> {
        let pool = self.pool.as_ref();
        self.retry
            .run(move || pool.execute(sql, params))
            .await
            .map_err(|e| EngineError::Store(annotate(e, sql, params)))
    }

    /// Runs a read, serving it from the query cache when allowed.
    pub(crate) async fn fetch(
        &self,
        sql: &str,
        params: &[Value],
        use_cache: bool,
    ) -> EngineResult<Vec<Record>> {
        let use_cache = use_cache && self.cache.is_enabled();
        let key = query_key(&self.descriptor.table, sql, params);

        if use_cache {
            if let Some(Value::Array(rows)) = self.cache.get(&key) {
                debug!(table = %self.descriptor.table, "query cache hit");
                return Ok(rows.into_iter().filter_map(into_record).collect());
            }
        }

        let planner = self.planner();
        let records: Vec<Record> = self
            .run(sql, params)
            .await?
            .into_iter()
            .map(|row| planner.decode(row))
            .collect();

        if use_cache {
            let cached = records.iter().cloned().map(Value::Object).collect();
            self.cache.set(key, Value::Array(cached));
        }
        Ok(records)
    }

    async fn read_by_id(&self, id: &Value, include_soft_deleted: bool) -> EngineResult<Option<Record>> {
        let planner = self.planner();
        let (sql, params) = planner.select_by_id(id, include_soft_deleted)?;
        let row = self.run(&sql, &params).await?.into_iter().next();
        Ok(row.map(|row| planner.decode(row)))
    }

    fn notify(&self, event: impl Fn(&dyn RecordObserver)) {
        for observer in &self.observers {
            event(observer.as_ref());
        }
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Looks a record up by primary key.
    ///
    /// The identity cache is consulted and filled only for default
    /// visibility; reads that include soft-deleted rows always hit the store.
    pub async fn find_by_id(
        &self,
        id: impl Into<Value>,
        options: &QueryOptions,
    ) -> EngineResult<Option<Record>> {
        let id = id.into();
        let cacheable = options.use_cache && !options.include_soft_deleted;
        let key = identity_key(&self.descriptor.table, id_text(&id));

        if cacheable {
            if let Some(cached) = self.cache.get(&key) {
                debug!(table = %self.descriptor.table, id = %id_text(&id), "identity cache hit");
                return Ok(into_record(cached));
            }
            debug!(table = %self.descriptor.table, id = %id_text(&id), "identity cache miss");
        }

        let record = self.read_by_id(&id, options.include_soft_deleted).await?;
        if cacheable {
            if let Some(record) = &record {
                self.cache.set(key, Value::Object(record.clone()));
            }
        }
        Ok(record)
    }

    /// First record matching `filters` in the default order.
    pub async fn find_one(
        &self,
        filters: &Filters,
        options: &QueryOptions,
    ) -> EngineResult<Option<Record>> {
        let planner = self.planner();
        let mut params = Vec::new();
        let clause = build_where(
            filters,
            &mut params,
            &planner.where_options(options.include_soft_deleted),
        )?;
        let order = build_order(&[], &planner.default_order())?;
        let sql = assemble(&[
            &format!("SELECT * FROM {}", self.descriptor.table),
            &clause,
            &order,
            "LIMIT 1",
        ]);
        Ok(self.fetch(&sql, &params, options.use_cache).await?.into_iter().next())
    }

    /// One page of records matching `filters`, with the total match count.
    ///
    /// The data and count queries run concurrently; either failing fails the
    /// call. Grouped queries are counted by group.
    pub async fn find_all(
        &self,
        filters: &Filters,
        options: &FindOptions,
    ) -> EngineResult<PaginationResult> {
        let planner = self.planner();
        let table = &self.descriptor.table;
        let joined = !options.joins.is_empty();

        // Qualify engine-owned columns once other tables are in scope.
        let soft_delete_column = format!("{table}.{DELETED_AT}");
        let mut where_options: WhereOptions<'_> =
            planner.where_options(options.include_soft_deleted);
        if joined && where_options.soft_delete_column.is_some() {
            where_options.soft_delete_column = Some(&soft_delete_column);
        }
        let mut default_order = planner.default_order();
        if joined && !default_order.column.contains('.') {
            default_order.column = format!("{table}.{}", default_order.column);
        }

        let mut where_params = Vec::new();
        let clause = build_where(filters, &mut where_params, &where_options)?;
        let select = build_select_list(&options.fields)?;
        let joins = build_joins(&options.joins)?;
        let group = build_group_by(&options.group_by)?;
        let mut having_params = Vec::new();
        let having = if group.is_empty() {
            String::new()
        } else {
            build_having(options.having.as_ref(), &mut having_params)
        };
        let order = build_order(&options.sort, &default_order)?;
        let page = build_pagination(options.page, options.limit);

        let data_sql = assemble(&[
            &format!("SELECT {select} FROM {table}"),
            &joins,
            &clause,
            &group,
            &having,
            &order,
            &page,
        ]);
        let mut data_params = where_params.clone();
        data_params.extend(having_params.iter().cloned());

        let (count_sql, count_params) = if group.is_empty() {
            let sql = assemble(&[
                &format!("SELECT COUNT(*) AS total FROM {table}"),
                &joins,
                &clause,
            ]);
            (sql, where_params)
        } else {
            let inner = assemble(&[
                &format!("SELECT 1 FROM {table}"),
                &joins,
                &clause,
                &group,
                &having,
            ]);
            let mut params = where_params;
            params.extend(having_params);
            (format!("SELECT COUNT(*) AS total FROM ({inner}) AS grouped"), params)
        };

        let (data, counted) = tokio::try_join!(
            self.fetch(&data_sql, &data_params, options.use_cache),
            self.fetch(&count_sql, &count_params, options.use_cache),
        )?;

        let total = counted
            .first()
            .and_then(|row| row.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);

        Ok(PaginationResult {
            data,
            pagination: PageInfo::new(total, options.page, options.limit),
        })
    }

    /// Whether any record matches `filters`.
    pub async fn exists(&self, filters: &Filters, options: &QueryOptions) -> EngineResult<bool> {
        let planner = self.planner();
        let mut params = Vec::new();
        let clause = build_where(
            filters,
            &mut params,
            &planner.where_options(options.include_soft_deleted),
        )?;
        let sql = assemble(&[
            &format!("SELECT 1 AS found FROM {}", self.descriptor.table),
            &clause,
            "LIMIT 1",
        ]);
        Ok(!self.fetch(&sql, &params, options.use_cache).await?.is_empty())
    }

    /// Runs a caller-written read. Results are cached under the entity when
    /// `use_cache` is set, so engine writes invalidate them.
    pub async fn query(
        &self,
        sql: &str,
        params: &[Value],
        use_cache: bool,
    ) -> EngineResult<Vec<Record>> {
        self.fetch(sql, params, use_cache).await
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Validates and inserts `data`, returning the stored record as re-read.
    ///
    /// A missing key is generated (UUID v7) unless the key column is
    /// integer-typed, in which case the store assigns it.
    pub async fn create(&self, data: Record) -> EngineResult<Record> {
        let planner = self.planner();
        planner.validate(&data, ValidationMode::Create)?;
        let prepared = planner.prepare_insert(data);
        let (sql, params) = planner.insert(&prepared)?;

        let rows = self.run(&sql, &params).await?;
        self.invalidate_cache();

        let id = returned_key(&rows, planner.primary_key())
            .or_else(|| prepared.get(planner.primary_key()).cloned())
            .unwrap_or(Value::Null);
        let record = self
            .read_by_id(&id, true)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        debug!(table = %self.descriptor.table, id = %id_text(&id), "created record");
        self.notify(|o| o.after_create(&record));
        Ok(record)
    }

    /// Validates and applies `data` to an existing record.
    ///
    /// Fails with [`EngineError::NotFound`] when the record does not exist or
    /// is soft-deleted and `include_soft_deleted` is not set. The key column
    /// cannot be changed.
    pub async fn update(
        &self,
        id: impl Into<Value>,
        data: Record,
        options: &QueryOptions,
    ) -> EngineResult<Record> {
        let id = id.into();
        let planner = self.planner();
        let before = self
            .read_by_id(&id, options.include_soft_deleted)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        planner.validate(&data, ValidationMode::Update)?;
        let changes = planner.prepare_update(data);
        if changes.is_empty() {
            return Ok(before);
        }

        let (sql, params) = planner.update_by_id(&id, &changes, options.include_soft_deleted)?;
        let touched = self.run(&sql, &params).await?;
        self.invalidate_cache();
        if touched.is_empty() {
            return Err(EngineError::not_found(&self.descriptor.table, id_text(&id)));
        }

        let after = self
            .read_by_id(&id, true)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        debug!(table = %self.descriptor.table, id = %id_text(&id), "updated record");
        self.notify(|o| o.after_update(&before, &after));
        Ok(after)
    }

    /// Removes a record, returning it as it was before removal.
    ///
    /// Entities without soft delete are always hard-deleted. A soft delete of
    /// an already-deleted record is [`EngineError::NotFound`].
    pub async fn delete(&self, id: impl Into<Value>, mode: DeleteMode) -> EngineResult<Record> {
        let id = id.into();
        let planner = self.planner();
        let mode = if self.descriptor.soft_delete {
            mode
        } else {
            DeleteMode::Hard
        };

        let record = self
            .read_by_id(&id, mode == DeleteMode::Hard)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        let (sql, params) = match mode {
            DeleteMode::Soft => planner.soft_delete(&id)?,
            DeleteMode::Hard => planner.hard_delete(&id)?,
        };
        let touched = self.run(&sql, &params).await?;
        self.invalidate_cache();
        if touched.is_empty() {
            return Err(EngineError::not_found(&self.descriptor.table, id_text(&id)));
        }

        debug!(table = %self.descriptor.table, id = %id_text(&id), ?mode, "deleted record");
        self.notify(|o| o.after_delete(&record, mode));
        Ok(record)
    }

    /// Clears the deletion marker of a soft-deleted record.
    pub async fn restore(&self, id: impl Into<Value>) -> EngineResult<Record> {
        if !self.descriptor.soft_delete {
            return Err(EngineError::Config(format!(
                "soft delete is not enabled for {}",
                self.descriptor.table
            )));
        }
        let id = id.into();
        let planner = self.planner();
        let before = self
            .read_by_id(&id, true)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        let (sql, params) = planner.restore(&id)?;
        self.run(&sql, &params).await?;
        self.invalidate_cache();

        let after = self
            .read_by_id(&id, false)
            .await?
            .ok_or_else(|| EngineError::not_found(&self.descriptor.table, id_text(&id)))?;

        debug!(table = %self.descriptor.table, id = %id_text(&id), "restored record");
        self.notify(|o| o.after_update(&before, &after));
        Ok(after)
    }

    /// Updates the record whose `conflict_key` (the primary key by default)
    /// matches `data`, soft-deleted or not, else creates it.
    pub async fn upsert(&self, data: Record, conflict_key: Option<&str>) -> EngineResult<Record> {
        let key = conflict_key.unwrap_or(&self.descriptor.primary_key);
        check_identifier(key)?;

        let existing = match data.get(key) {
            Some(value) if !value.is_null() => {
                let filters = Filters::new().eq(key, value.clone());
                let options = QueryOptions {
                    include_soft_deleted: true,
                    use_cache: false,
                };
                self.find_one(&filters, &options).await?
            }
            _ => None,
        };

        match existing.and_then(|r| r.get(&self.descriptor.primary_key).cloned()) {
            Some(id) => {
                self.update(id, data, &QueryOptions::including_deleted())
                    .await
            }
            None => self.create(data).await,
        }
    }
}

impl<P: ConnectionPool> Drop for RecordEngine<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

/// Attaches the statement to a store error that does not carry one yet.
pub(crate) fn annotate(err: StoreError, sql: &str, params: &[Value]) -> StoreError {
    if err.sql.is_some() {
        err
    } else {
        err.with_statement(sql, params)
    }
}

fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(record) => Some(record),
        _ => None,
    }
}
