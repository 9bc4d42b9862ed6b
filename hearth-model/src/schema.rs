use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Record;

/// The logical type of a column, resolved once from its declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Decimal,
    Text,
    Date,
    Boolean,
    /// JSON-like nested value, stored serialized as text.
    Structured,
    /// Anything the engine does not recognise (BLOB, untyped). Not checked.
    Other,
}

impl LogicalType {
    /// Maps a declared SQL type (`VARCHAR(50)`, `DECIMAL(10,2)`, `JSON`, ...) to
    /// its logical type.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();

        if base.is_empty() {
            Self::Other
        } else if base.contains("JSON") {
            Self::Structured
        } else if base.contains("BOOL") || upper.replace(' ', "") == "TINYINT(1)" {
            Self::Boolean
        } else if base.contains("DATE") || base.contains("TIME") {
            Self::Date
        } else if base.contains("INT") {
            Self::Integer
        } else if ["DEC", "NUM", "REAL", "FLOA", "DOUB"]
            .iter()
            .any(|t| base.contains(t))
        {
            Self::Decimal
        } else if ["CHAR", "TEXT", "CLOB", "UUID", "ENUM"]
            .iter()
            .any(|t| base.contains(t))
        {
            Self::Text
        } else {
            Self::Other
        }
    }

    /// Checks that a non-null value is compatible with this type.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            Self::Integer => match value {
                Value::Number(n) => {
                    n.is_i64()
                        || n.is_u64()
                        || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
                }
                Value::String(s) => s.trim().parse::<i64>().is_ok(),
                _ => false,
            },
            Self::Decimal => match value {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
                _ => false,
            },
            Self::Text => value.is_string(),
            Self::Date => match value {
                Value::String(s) => parse_date(s).is_some(),
                Value::Number(n) => n.is_i64() || n.is_u64(),
                _ => false,
            },
            Self::Boolean => match value {
                Value::Bool(_) => true,
                Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
                _ => false,
            },
            Self::Structured | Self::Other => true,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("expected {}, got {}", self.expectation(), json_kind(value)))
        }
    }

    fn expectation(&self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Decimal => "a number",
            Self::Text => "a string",
            Self::Date => "a date",
            Self::Boolean => "a boolean or 0/1",
            Self::Structured => "a JSON value",
            Self::Other => "any value",
        }
    }
}

/// Parses the date formats accepted for date/time columns.
fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Introspected metadata of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
    /// The type as declared in the table definition.
    pub declared_type: String,
    pub nullable: bool,
    /// Default expression as reported by the store, if any.
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub max_length: Option<u32>,
    pub numeric_precision: Option<u32>,
    pub numeric_scale: Option<u32>,
}

impl ColumnSchema {
    /// Builds a column from its declared SQL type, deriving the logical type,
    /// length and precision.
    pub fn from_declared(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        let declared_type = declared_type.into();
        let logical_type = LogicalType::from_declared(&declared_type);
        let args = type_arguments(&declared_type);

        let (max_length, numeric_precision, numeric_scale) = match logical_type {
            LogicalType::Text => (args.first().copied(), None, None),
            LogicalType::Decimal | LogicalType::Integer => {
                (None, args.first().copied(), args.get(1).copied())
            }
            _ => (None, None, None),
        };

        Self {
            name: name.into(),
            logical_type,
            declared_type,
            nullable: true,
            default_value: None,
            is_primary_key: false,
            is_unique: false,
            max_length,
            numeric_precision,
            numeric_scale,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_unique = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default_value = Some(expr.into());
        self
    }
}

/// Numeric arguments of a declared type: `DECIMAL(10, 2)` gives `[10, 2]`.
fn type_arguments(declared: &str) -> Vec<u32> {
    let Some(open) = declared.find('(') else {
        return Vec::new();
    };
    let Some(close) = declared[open..].find(')') else {
        return Vec::new();
    };
    declared[open + 1..open + close]
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

/// Which write a payload is validated for. Nullability is only enforced on create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

/// Column metadata of one table, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    table: String,
    columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Validates every field of `data` that the schema knows about.
    ///
    /// Fields missing from the schema pass through untouched (computed or
    /// virtual columns). All violations are returned together.
    pub fn validate(&self, data: &Record, mode: ValidationMode) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (field, value) in data {
            let Some(column) = self.column(field) else {
                continue;
            };

            if value.is_null() {
                if !column.nullable && mode == ValidationMode::Create {
                    errors.push(format!("{field}: cannot be null"));
                }
                continue;
            }

            if let Err(reason) = column.logical_type.validate(value) {
                errors.push(format!("{field}: {reason}"));
            }

            if let (Some(max), Value::String(s)) = (column.max_length, value) {
                let len = s.chars().count();
                if len > max as usize {
                    errors.push(format!(
                        "{field}: exceeds maximum length of {max} (got {len})"
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Serializes values of structured columns to JSON text for storage.
    pub fn encode(&self, record: &mut Record) {
        for column in &self.columns {
            if column.logical_type != LogicalType::Structured {
                continue;
            }
            if let Some(value) = record.get_mut(&column.name) {
                if !value.is_null() {
                    *value = Value::String(value.to_string());
                }
            }
        }
    }

    /// Reverses [`Self::encode`] on a row read from storage and turns 0/1
    /// boolean columns back into booleans.
    pub fn decode(&self, record: &mut Record) {
        for column in &self.columns {
            let Some(value) = record.get_mut(&column.name) else {
                continue;
            };
            match column.logical_type {
                LogicalType::Structured => {
                    if let Value::String(text) = value {
                        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                            *value = parsed;
                        }
                    }
                }
                LogicalType::Boolean => {
                    if let Some(n) = value.as_i64() {
                        *value = Value::Bool(n != 0);
                    }
                }
                _ => {}
            }
        }
    }
}
