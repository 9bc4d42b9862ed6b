use hearth_model::{Filter, Filters, Join, SortField};
use serde_json::Value;

use crate::error::{QueryError, QueryResult};
use crate::ident::check_identifier;

/// Options for [`build_where`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereOptions<'a> {
    /// Deletion-marker column, when the entity soft-deletes.
    pub soft_delete_column: Option<&'a str>,
    pub include_soft_deleted: bool,
    /// Extra caller-written condition ANDed after the filters.
    pub extra_condition: Option<&'a str>,
}

/// A caller-written condition with its own bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCondition {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RawCondition {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn render(column: &str, filter: &Filter, params: &mut Vec<Value>) -> QueryResult<String> {
    check_identifier(column)?;

    let condition = match filter {
        Filter::Equals(Value::Null) | Filter::IsNull => format!("{column} IS NULL"),
        Filter::IsNotNull => format!("{column} IS NOT NULL"),
        Filter::Equals(value) => {
            params.push(value.clone());
            format!("{column} = ?")
        }
        // Guard against an accidental `IN ()`: matches nothing.
        Filter::In(values) if values.is_empty() => "1 = 0".to_string(),
        Filter::In(values) => {
            params.extend(values.iter().cloned());
            format!("{column} IN ({})", placeholders(values.len()))
        }
        // Excluding nothing keeps every row.
        Filter::NotIn(values) if values.is_empty() => "1 = 1".to_string(),
        Filter::NotIn(values) => {
            params.extend(values.iter().cloned());
            format!("{column} NOT IN ({})", placeholders(values.len()))
        }
        Filter::Like(pattern) => {
            params.push(Value::String(format!("%{pattern}%")));
            format!("{column} LIKE ?")
        }
        Filter::NotLike(pattern) => {
            params.push(Value::String(format!("%{pattern}%")));
            format!("{column} NOT LIKE ?")
        }
        Filter::Between(lo, hi) => {
            params.push(lo.clone());
            params.push(hi.clone());
            format!("{column} BETWEEN ? AND ?")
        }
        Filter::Compare(op, value) => {
            params.push(value.clone());
            format!("{column} {} ?", op.as_sql())
        }
        Filter::Raw { sql, params: raw } => {
            let sql = sql.trim();
            if sql.is_empty() {
                return Err(QueryError::EmptyRaw(column.to_string()));
            }
            params.extend(raw.iter().cloned());
            format!("{column} {sql}")
        }
    };
    Ok(condition)
}

/// Renders the WHERE clause for `filters`, appending bound values to `params`.
///
/// Returns an empty string when there is no condition at all.
pub fn build_where(
    filters: &Filters,
    params: &mut Vec<Value>,
    options: &WhereOptions<'_>,
) -> QueryResult<String> {
    let mut conditions = Vec::with_capacity(filters.len() + 2);

    if let Some(column) = options.soft_delete_column {
        if !options.include_soft_deleted {
            conditions.push(format!("{column} IS NULL"));
        }
    }

    for (column, filter) in filters.iter() {
        conditions.push(render(column, filter, params)?);
    }

    if let Some(extra) = options.extra_condition.map(str::trim) {
        if !extra.is_empty() {
            conditions.push(format!("({extra})"));
        }
    }

    if conditions.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("WHERE {}", conditions.join(" AND ")))
    }
}

/// Renders ORDER BY, falling back to `default` when no sort is given.
pub fn build_order(sort: &[SortField], default: &SortField) -> QueryResult<String> {
    let fields = if sort.is_empty() {
        std::slice::from_ref(default)
    } else {
        sort
    };

    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        check_identifier(&field.column)?;
        parts.push(format!("{} {}", field.column, field.direction.as_sql()));
    }
    Ok(format!("ORDER BY {}", parts.join(", ")))
}

/// Renders LIMIT/OFFSET. Page numbers start at 1; page 0 is treated as 1.
pub fn build_pagination(page: u32, limit: u32) -> String {
    let offset = u64::from(page.max(1) - 1) * u64::from(limit);
    format!("LIMIT {limit} OFFSET {offset}")
}

/// Renders literal join descriptors.
pub fn build_joins(joins: &[Join]) -> QueryResult<String> {
    let mut parts = Vec::with_capacity(joins.len());
    for join in joins {
        check_identifier(&join.table).map_err(|_| QueryError::MalformedJoin {
            table: join.table.clone(),
            reason: "invalid table name".into(),
        })?;
        let on = join.on.trim();
        if on.is_empty() {
            return Err(QueryError::MalformedJoin {
                table: join.table.clone(),
                reason: "missing ON condition".into(),
            });
        }
        parts.push(format!("{} {} ON {on}", join.kind.as_sql(), join.table));
    }
    Ok(parts.join(" "))
}

pub fn build_group_by(columns: &[String]) -> QueryResult<String> {
    if columns.is_empty() {
        return Ok(String::new());
    }
    for column in columns {
        check_identifier(column)?;
    }
    Ok(format!("GROUP BY {}", columns.join(", ")))
}

pub fn build_having(having: Option<&RawCondition>, params: &mut Vec<Value>) -> String {
    match having {
        Some(h) if !h.sql.trim().is_empty() => {
            params.extend(h.params.iter().cloned());
            format!("HAVING {}", h.sql.trim())
        }
        _ => String::new(),
    }
}

/// Renders the projection. An empty list selects `*`; entries may be
/// columns, `table.column`, `*` or `table.*`.
pub fn build_select_list(fields: &[String]) -> QueryResult<String> {
    if fields.is_empty() {
        return Ok("*".to_string());
    }
    for field in fields {
        match field.strip_suffix(".*") {
            _ if field == "*" => {}
            Some(table) => check_identifier(table)?,
            None => check_identifier(field)?,
        }
    }
    Ok(fields.join(", "))
}
