//! Search query abstraction.
//!
//! Used both for client search and internally for conditional-reference and
//! `If-None-Exist` matching. A [`SearchQuery`] binds raw parameter pairs to
//! the typed parameter catalog of one resource type and doubles as the
//! storage-level predicate via [`SearchQuery::matches`].

mod params;
mod query;

pub use params::{parameters_for, ParamDef, SearchParamKind, SearchPrefix};
pub use query::{parse_query_string, DateFilter, SearchPage, SearchQuery};
