use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// Relational comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Gt,
    Lt,
    Gte,
    Lte,
    Ne,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Ne => "!=",
        }
    }

    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            "!=" | "<>" => Self::Ne,
            _ => return None,
        })
    }
}

/// A condition on a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Equals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Substring match; the value is wrapped in `%` wildcards.
    Like(String),
    NotLike(String),
    /// Inclusive range.
    Between(Value, Value),
    IsNull,
    IsNotNull,
    Compare(CompareOp, Value),
    /// Caller-supplied SQL rendered after the column name, with its own
    /// bound parameters. Bypasses the fixed vocabulary; audit call sites.
    Raw { sql: String, params: Vec<Value> },
}

impl Filter {
    /// Interprets the loosely-shaped filter value callers send over the wire.
    ///
    /// - an array becomes [`Filter::In`]
    /// - `{"operator": "...", "value": ...}` dispatches on the operator
    /// - `{"raw": "...", "params": [...]}` becomes [`Filter::Raw`]
    /// - anything else is an equality
    pub fn from_json(column: &str, value: Value) -> ModelResult<Self> {
        let invalid = |reason: String| ModelError::InvalidFilter {
            column: column.to_string(),
            reason,
        };

        let mut obj = match value {
            Value::Array(items) => return Ok(Self::In(items)),
            Value::Object(obj) if obj.contains_key("operator") || obj.contains_key("raw") => obj,
            other => return Ok(Self::Equals(other)),
        };

        if let Some(raw) = obj.remove("raw") {
            let Value::String(sql) = raw else {
                return Err(invalid("raw fragment must be a string".into()));
            };
            let params = match obj.remove("params") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(params)) => params,
                Some(_) => return Err(invalid("raw params must be an array".into())),
            };
            return Ok(Self::Raw { sql, params });
        }

        let operator = obj
            .remove("operator")
            .and_then(|op| op.as_str().map(|s| s.trim().to_ascii_lowercase()))
            .ok_or_else(|| invalid("operator must be a string".into()))?;
        let value = obj.remove("value").unwrap_or(Value::Null);

        let text = |value: Value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let list = |value: Value| match value {
            Value::Array(items) => Ok(items),
            _ => Err(invalid(format!("{operator} requires an array"))),
        };

        Ok(match operator.as_str() {
            "like" => Self::Like(text(value)),
            "not like" | "not_like" => Self::NotLike(text(value)),
            "in" => Self::In(list(value)?),
            "not in" | "not_in" => Self::NotIn(list(value)?),
            "between" => {
                let bounds = list(value)?;
                match <[Value; 2]>::try_from(bounds) {
                    Ok([lo, hi]) => Self::Between(lo, hi),
                    Err(bounds) => {
                        return Err(invalid(format!(
                            "between requires exactly two values, got {}",
                            bounds.len()
                        )));
                    }
                }
            }
            "is null" | "is_null" => Self::IsNull,
            "is not null" | "is_not_null" => Self::IsNotNull,
            "=" => Self::Equals(value),
            other => match CompareOp::parse(other) {
                Some(op) => Self::Compare(op, value),
                None => return Err(invalid(format!("unsupported operator {other:?}"))),
            },
        })
    }
}

/// An ordered list of column conditions, joined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    entries: Vec<(String, Filter)>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds filters from a JSON object, one entry per key.
    pub fn from_json(object: serde_json::Map<String, Value>) -> ModelResult<Self> {
        let mut filters = Self::new();
        for (column, value) in object {
            let filter = Filter::from_json(&column, value)?;
            filters.entries.push((column, filter));
        }
        Ok(filters)
    }

    pub fn push(mut self, column: impl Into<String>, filter: Filter) -> Self {
        self.entries.push((column.into(), filter));
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, Filter::Equals(value.into()))
    }

    pub fn is_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(column, Filter::In(values))
    }

    pub fn not_in<V: Into<Value>>(
        self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(column, Filter::NotIn(values))
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(column, Filter::Like(pattern.into()))
    }

    pub fn not_like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.push(column, Filter::NotLike(pattern.into()))
    }

    pub fn between(
        self,
        column: impl Into<String>,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Self {
        self.push(column, Filter::Between(lo.into(), hi.into()))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.push(column, Filter::IsNull)
    }

    pub fn is_not_null(self, column: impl Into<String>) -> Self {
        self.push(column, Filter::IsNotNull)
    }

    pub fn compare(self, column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.push(column, Filter::Compare(op, value.into()))
    }

    pub fn raw(self, column: impl Into<String>, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.push(
            column,
            Filter::Raw {
                sql: sql.into(),
                params,
            },
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Filter)> {
        self.entries.iter().map(|(c, f)| (c.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
