//! Whole-statement builders for writes. Values are bound by the caller in
//! the order the placeholders appear.

use crate::error::{QueryError, QueryResult};
use crate::ident::check_identifier;

fn returning_clause(returning: Option<&str>) -> QueryResult<String> {
    match returning {
        Some(column) => {
            check_identifier(column)?;
            Ok(format!(" RETURNING {column}"))
        }
        None => Ok(String::new()),
    }
}

/// `INSERT INTO table (a, b) VALUES (?, ?), (?, ?)` for `rows` rows.
pub fn build_insert(
    table: &str,
    columns: &[String],
    rows: usize,
    returning: Option<&str>,
) -> QueryResult<String> {
    check_identifier(table)?;
    if rows == 0 {
        return Err(QueryError::EmptyStatement("insert"));
    }
    let returning = returning_clause(returning)?;

    if columns.is_empty() {
        if rows > 1 {
            return Err(QueryError::EmptyStatement("insert"));
        }
        return Ok(format!("INSERT INTO {table} DEFAULT VALUES{returning}"));
    }

    for column in columns {
        check_identifier(column)?;
    }
    let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
    let values = vec![tuple.as_str(); rows].join(", ");
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES {values}{returning}",
        columns.join(", ")
    ))
}

/// `UPDATE table SET a = ?, b = ? <where>`.
pub fn build_update(
    table: &str,
    columns: &[String],
    where_clause: &str,
    returning: Option<&str>,
) -> QueryResult<String> {
    check_identifier(table)?;
    if columns.is_empty() {
        return Err(QueryError::EmptyStatement("update"));
    }
    let mut assignments = Vec::with_capacity(columns.len());
    for column in columns {
        check_identifier(column)?;
        assignments.push(format!("{column} = ?"));
    }
    let returning = returning_clause(returning)?;
    Ok(format!(
        "UPDATE {table} SET {}{}{returning}",
        assignments.join(", "),
        leading_space(where_clause)
    ))
}

/// `DELETE FROM table <where>`.
pub fn build_delete(
    table: &str,
    where_clause: &str,
    returning: Option<&str>,
) -> QueryResult<String> {
    check_identifier(table)?;
    let returning = returning_clause(returning)?;
    Ok(format!(
        "DELETE FROM {table}{}{returning}",
        leading_space(where_clause)
    ))
}

fn leading_space(fragment: &str) -> String {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        String::new()
    } else {
        format!(" {fragment}")
    }
}
