use std::fmt::Display;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix shared by every cache entry of `table`.
pub fn entity_prefix(table: &str) -> String {
    format!("{table}:")
}

/// Prefix shared by the identity entries of `table`.
pub fn identity_prefix(table: &str) -> String {
    format!("{table}:id:")
}

/// Key of the identity entry for one record.
pub fn identity_key(table: &str, id: impl Display) -> String {
    format!("{table}:id:{id}")
}

/// Stable hex fingerprint of a statement and its parameters.
pub fn query_fingerprint(sql: &str, params: &[Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    for param in params {
        hasher.update([0x1f]);
        hasher.update(param.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Key of a cached query result for `table`.
pub fn query_key(table: &str, sql: &str, params: &[Value]) -> String {
    format!("{table}:query:{}", query_fingerprint(sql, params))
}
