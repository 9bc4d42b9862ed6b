//! Statement construction shared by the engine and transactions.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use hearth_db::Row;
use hearth_model::{
    CREATED_AT, DELETED_AT, EntityDescriptor, Filters, LogicalType, Record, SortField,
    TableSchema, UPDATED_AT, ValidationMode,
};
use hearth_query::{WhereOptions, build_delete, build_insert, build_update, build_where};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// A statement and its bound parameters.
pub(crate) type Statement = (String, Vec<Value>);

/// Current time as stored in timestamp columns.
pub(crate) fn now_timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Renders an id for messages and cache keys.
pub(crate) fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) struct Planner<'a> {
    pub(crate) descriptor: &'a EntityDescriptor,
    pub(crate) schema: Option<Arc<TableSchema>>,
}

impl<'a> Planner<'a> {
    pub(crate) fn new(descriptor: &'a EntityDescriptor, schema: Option<Arc<TableSchema>>) -> Self {
        Self { descriptor, schema }
    }

    pub(crate) fn table(&self) -> &str {
        &self.descriptor.table
    }

    pub(crate) fn primary_key(&self) -> &str {
        &self.descriptor.primary_key
    }

    /// Whether `column` can be written. Without a schema every column is
    /// assumed to exist.
    fn has_column(&self, column: &str) -> bool {
        self.schema.as_ref().is_none_or(|s| s.contains(column))
    }

    fn stamps_timestamps(&self) -> bool {
        self.descriptor.timestamps
    }

    pub(crate) fn where_options(&self, include_soft_deleted: bool) -> WhereOptions<'static> {
        WhereOptions {
            soft_delete_column: self.descriptor.soft_delete.then_some(DELETED_AT),
            include_soft_deleted,
            extra_condition: None,
        }
    }

    /// Newest first when records are timestamped, else by key.
    pub(crate) fn default_order(&self) -> SortField {
        if self.stamps_timestamps() && self.has_column(CREATED_AT) {
            SortField::desc(CREATED_AT)
        } else {
            SortField::asc(self.primary_key())
        }
    }

    pub(crate) fn validate(&self, data: &Record, mode: ValidationMode) -> EngineResult<()> {
        if !self.descriptor.validation {
            return Ok(());
        }
        match &self.schema {
            Some(schema) => schema.validate(data, mode).map_err(EngineError::Validation),
            None => Ok(()),
        }
    }

    /// Validates every record, prefixing messages with the record index.
    pub(crate) fn validate_all(&self, records: &[Record], mode: ValidationMode) -> EngineResult<()> {
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            if let Err(EngineError::Validation(messages)) = self.validate(record, mode) {
                errors.extend(messages.into_iter().map(|m| format!("record {index}: {m}")));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(errors))
        }
    }

    fn key_is_integer(&self) -> bool {
        self.schema
            .as_ref()
            .and_then(|s| s.column(self.primary_key()))
            .is_some_and(|c| c.logical_type == LogicalType::Integer)
    }

    /// Fills in the generated key and timestamps and encodes structured
    /// columns. Does not validate.
    pub(crate) fn prepare_insert(&self, mut data: Record) -> Record {
        let key = self.primary_key().to_string();
        let missing_key = data.get(&key).is_none_or(Value::is_null);
        if missing_key {
            if self.key_is_integer() {
                data.remove(&key);
            } else {
                data.insert(key, Value::String(Uuid::now_v7().to_string()));
            }
        }

        if self.stamps_timestamps() {
            let now = now_timestamp();
            for column in [CREATED_AT, UPDATED_AT] {
                if self.has_column(column) && data.get(column).is_none_or(Value::is_null) {
                    data.insert(column.to_string(), now.clone());
                }
            }
        }

        self.encode(&mut data);
        data
    }

    /// Drops the key, stamps `updated_at` and encodes structured columns.
    pub(crate) fn prepare_update(&self, mut data: Record) -> Record {
        data.remove(self.primary_key());
        if self.stamps_timestamps() && self.has_column(UPDATED_AT) {
            data.insert(UPDATED_AT.to_string(), now_timestamp());
        }
        self.encode(&mut data);
        data
    }

    fn encode(&self, data: &mut Record) {
        if let Some(schema) = &self.schema {
            schema.encode(data);
        }
    }

    pub(crate) fn decode(&self, mut row: Row) -> Record {
        if let Some(schema) = &self.schema {
            schema.decode(&mut row);
        }
        row
    }

    pub(crate) fn select_by_id(&self, id: &Value, include_soft_deleted: bool) -> EngineResult<Statement> {
        let mut params = Vec::new();
        let filters = Filters::new().eq(self.primary_key(), id.clone());
        let clause = build_where(&filters, &mut params, &self.where_options(include_soft_deleted))?;
        Ok((format!("SELECT * FROM {} {clause} LIMIT 1", self.table()), params))
    }

    pub(crate) fn insert(&self, record: &Record) -> EngineResult<Statement> {
        let columns: Vec<String> = record.keys().cloned().collect();
        let sql = build_insert(self.table(), &columns, 1, Some(self.primary_key()))?;
        Ok((sql, record.values().cloned().collect()))
    }

    /// UPDATE of one record by key. Returns the key of the touched row.
    pub(crate) fn update_by_id(
        &self,
        id: &Value,
        changes: &Record,
        include_soft_deleted: bool,
    ) -> EngineResult<Statement> {
        let columns: Vec<String> = changes.keys().cloned().collect();
        let mut params: Vec<Value> = changes.values().cloned().collect();
        let filters = Filters::new().eq(self.primary_key(), id.clone());
        let clause = build_where(&filters, &mut params, &self.where_options(include_soft_deleted))?;
        let sql = build_update(self.table(), &columns, &clause, Some(self.primary_key()))?;
        Ok((sql, params))
    }

    /// UPDATE of every row matching `filters`.
    pub(crate) fn update_where(
        &self,
        filters: &Filters,
        changes: &Record,
        include_soft_deleted: bool,
    ) -> EngineResult<Statement> {
        let columns: Vec<String> = changes.keys().cloned().collect();
        let mut params: Vec<Value> = changes.values().cloned().collect();
        let clause = build_where(filters, &mut params, &self.where_options(include_soft_deleted))?;
        let sql = build_update(self.table(), &columns, &clause, Some(self.primary_key()))?;
        Ok((sql, params))
    }

    /// Stamps the deletion marker on a live record.
    pub(crate) fn soft_delete(&self, id: &Value) -> EngineResult<Statement> {
        let now = now_timestamp();
        let mut changes = Record::new();
        changes.insert(DELETED_AT.to_string(), now.clone());
        if self.stamps_timestamps() && self.has_column(UPDATED_AT) {
            changes.insert(UPDATED_AT.to_string(), now);
        }
        self.update_by_id(id, &changes, false)
    }

    pub(crate) fn restore(&self, id: &Value) -> EngineResult<Statement> {
        let mut changes = Record::new();
        changes.insert(DELETED_AT.to_string(), Value::Null);
        if self.stamps_timestamps() && self.has_column(UPDATED_AT) {
            changes.insert(UPDATED_AT.to_string(), now_timestamp());
        }
        self.update_by_id(id, &changes, true)
    }

    pub(crate) fn hard_delete(&self, id: &Value) -> EngineResult<Statement> {
        let mut params = Vec::new();
        let filters = Filters::new().eq(self.primary_key(), id.clone());
        let clause = build_where(&filters, &mut params, &WhereOptions::default())?;
        let sql = build_delete(self.table(), &clause, Some(self.primary_key()))?;
        Ok((sql, params))
    }
}

/// The key of the first returned row, if any.
pub(crate) fn returned_key(rows: &[Row], key: &str) -> Option<Value> {
    rows.first()
        .and_then(|row| row.get(key))
        .filter(|v| !v.is_null())
        .cloned()
}
