//! Search layer facade.
//!
//! - **[`fts`]**: query escaping and the SQL for the per-language text indexes.
//! - **[`rank`]**: match-statistics decoding and pluggable relevance scoring.
//! - **[`query`]**: index routing, ranked and cascading search, point lookups.

pub mod fts;
pub mod query;
pub mod rank;
