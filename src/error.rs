//! Error kinds surfaced by the catalog store.

use thiserror::Error;

use crate::search::rank::MatchInfoError;

/// Failure reported by a record source while producing the next record.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// The record iterator failed mid-stream; the ingest was rolled back.
    #[error("record source failed: {0}")]
    Source(#[from] SourceError),

    /// A malformed record or match-statistics blob.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store rejected a read or write.
    #[error("store error: {0}")]
    Transaction(#[from] rusqlite::Error),

    /// A key lookup found no row. A normal outcome, not a failure.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The caller's cancel token fired; the open transaction was rolled back.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<MatchInfoError> for CatalogError {
    fn from(e: MatchInfoError) -> Self {
        CatalogError::Validation(e.to_string())
    }
}

impl CatalogError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CatalogError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound { .. })
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
