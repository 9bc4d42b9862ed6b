use crate::error::{QueryError, QueryResult};

fn is_plain(part: &str) -> bool {
    let mut chars = part.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Accepts `name` or `table.name`, rejecting anything that would need quoting.
pub fn check_identifier(name: &str) -> QueryResult<()> {
    let valid = match name.split_once('.') {
        Some((table, column)) => is_plain(table) && is_plain(column),
        None => is_plain(name),
    };
    if valid {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}
