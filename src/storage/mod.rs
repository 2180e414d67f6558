//! Persistence layer: the `SQLite` store and its generation bookkeeping.

pub mod generations;
pub mod sqlite;

pub use generations::SweepReport;
pub use sqlite::CatalogStore;
