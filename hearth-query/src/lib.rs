//! SQL text generation for the Hearth record engine.
//!
//! Every builder renders a fragment with `?` placeholders and appends the
//! matching values to a caller-owned parameter list, so fragments can be
//! concatenated in order:
//!
//! ```
//! use hearth_model::{Filters, SortField};
//! use hearth_query::{WhereOptions, build_order, build_pagination, build_where};
//!
//! let mut params = Vec::new();
//! let filters = Filters::new().eq("status", "open").is_in("kind", ["zakat"]);
//! let clause = build_where(&filters, &mut params, &WhereOptions::default()).unwrap();
//! assert_eq!(clause, "WHERE status = ? AND kind IN (?)");
//! assert_eq!(params.len(), 2);
//!
//! let order = build_order(&[], &SortField::desc("created_at")).unwrap();
//! assert_eq!(order, "ORDER BY created_at DESC");
//! assert_eq!(build_pagination(3, 20), "LIMIT 20 OFFSET 40");
//! ```
//!
//! Column and table names are checked with [`check_identifier`]; only
//! [`Filter::Raw`](hearth_model::Filter::Raw), join conditions and HAVING
//! conditions carry caller-written SQL.

mod clause;
mod error;
mod ident;
mod statement;

pub use clause::{
    RawCondition, WhereOptions, build_group_by, build_having, build_joins, build_order,
    build_pagination, build_select_list, build_where,
};
pub use error::{QueryError, QueryResult};
pub use ident::check_identifier;
pub use statement::{build_delete, build_insert, build_update};
