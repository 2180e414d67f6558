//! Record sources feeding the ingest pipeline.
//!
//! Anything that yields `Result<Record, SourceError>` is a source: the
//! pipeline pulls until the sequence ends and aborts on the first error.

pub mod tsv;

use crate::error::SourceError;
use crate::model::types::Record;

pub trait RecordSource {
    /// `None` ends the sequence; `Some(Err(_))` is fatal for the ingest.
    fn next_record(&mut self) -> Option<Result<Record, SourceError>>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = Result<Record, SourceError>>,
{
    fn next_record(&mut self) -> Option<Result<Record, SourceError>> {
        self.next()
    }
}

/// Wrap already-decoded records as a source.
pub fn from_records(records: Vec<Record>) -> impl RecordSource {
    records.into_iter().map(Ok)
}
