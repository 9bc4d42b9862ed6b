//! Basic relationship lookups between entities.

use std::str::FromStr;

use hearth_db::ConnectionPool;
use hearth_model::{Filters, Record};
use hearth_query::{WhereOptions, build_where, check_identifier};
use serde::{Deserialize, Serialize};

use crate::engine::{RecordEngine, assemble};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Rows of the related table whose foreign key points at this record.
    HasMany,
    /// Like `HasMany`, at most one row.
    HasOne,
    /// The row of the related table this record's foreign key points at.
    BelongsTo,
}

impl FromStr for RelationKind {
    type Err = EngineError;

    /// Accepts `has_many`, `hasMany` or `has-many` spellings. Anything else,
    /// many-to-many included, is unsupported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "hasmany" => Ok(Self::HasMany),
            "hasone" => Ok(Self::HasOne),
            "belongsto" => Ok(Self::BelongsTo),
            _ => Err(EngineError::Query(format!("unsupported relation type: {s}"))),
        }
    }
}

/// A relationship from this engine's entity to another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub kind: RelationKind,
    /// The related table.
    pub table: String,
    /// For `HasMany`/`HasOne` the column of the related table; for
    /// `BelongsTo` the column of this record.
    pub foreign_key: String,
    /// The referenced key: this entity's primary key for `HasMany`/`HasOne`,
    /// `id` of the related table for `BelongsTo`, unless overridden.
    pub owner_key: Option<String>,
}

impl Relation {
    pub fn new(kind: RelationKind, table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            foreign_key: foreign_key.into(),
            owner_key: None,
        }
    }

    pub fn has_many(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasMany, table, foreign_key)
    }

    pub fn has_one(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::HasOne, table, foreign_key)
    }

    pub fn belongs_to(table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self::new(RelationKind::BelongsTo, table, foreign_key)
    }

    pub fn with_owner_key(mut self, column: impl Into<String>) -> Self {
        self.owner_key = Some(column.into());
        self
    }
}

impl<P: ConnectionPool> RecordEngine<P> {
    /// Loads the rows related to `record`.
    ///
    /// Related rows are returned as stored (no soft-delete filtering, no
    /// decoding). A record missing the linking value has no related rows.
    pub async fn related(&self, record: &Record, relation: &Relation) -> EngineResult<Vec<Record>> {
        check_identifier(&relation.table)?;
        check_identifier(&relation.foreign_key)?;

        let (local, remote, limit) = match relation.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                let owner = relation
                    .owner_key
                    .as_deref()
                    .unwrap_or(&self.descriptor().primary_key);
                let limit = relation.kind == RelationKind::HasOne;
                (owner, relation.foreign_key.as_str(), limit)
            }
            RelationKind::BelongsTo => {
                let owner = relation.owner_key.as_deref().unwrap_or("id");
                (relation.foreign_key.as_str(), owner, true)
            }
        };
        check_identifier(remote)?;

        let Some(value) = record.get(local).filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };

        let mut params = Vec::new();
        let clause = build_where(
            &Filters::new().eq(remote, value.clone()),
            &mut params,
            &WhereOptions::default(),
        )?;
        let sql = assemble(&[
            &format!("SELECT * FROM {}", relation.table),
            &clause,
            if limit { "LIMIT 1" } else { "" },
        ]);
        Ok(self.run(&sql, &params).await?)
    }
}
