use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Record;
use crate::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Normalizes caller input: `"desc"` in any case is descending, anything
    /// else ascending.
    pub fn parse(input: &str) -> Self {
        if input.trim().eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub column: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Builds a sort field from loose caller input such as `("name", "DESC")`.
    pub fn parse(column: impl Into<String>, direction: &str) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::parse(direction),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INNER" | "INNER JOIN" | "JOIN" => Ok(Self::Inner),
            "LEFT" | "LEFT JOIN" | "LEFT OUTER JOIN" => Ok(Self::Left),
            "RIGHT" | "RIGHT JOIN" | "RIGHT OUTER JOIN" => Ok(Self::Right),
            _ => Err(ModelError::UnsupportedJoin(s.to_string())),
        }
    }
}

/// A literal join descriptor. The `on` condition is caller-written SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

impl Join {
    pub fn new(kind: JoinKind, table: impl Into<String>, on: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            on: on.into(),
        }
    }
}

/// Paging metadata of a [`PaginationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Matching rows before pagination is applied.
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        let page = page.max(1);
        let total_pages = if limit == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit))
        };
        Self {
            total,
            page,
            limit,
            total_pages,
            has_next: u64::from(page) * u64::from(limit) < total,
            has_prev: page > 1,
        }
    }
}

/// One page of records plus the paging metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationResult {
    pub data: Vec<Record>,
    pub pagination: PageInfo,
}

/// Cumulative progress reported by bulk and batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    /// Total work, when known up front.
    pub total: Option<u64>,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            Some(total) => write!(f, "{}/{}", self.processed, total),
            None => write!(f, "{}", self.processed),
        }
    }
}
