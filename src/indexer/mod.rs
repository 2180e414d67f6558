//! Bulk ingest pipeline.
//!
//! One call consumes a whole record source inside a single write
//! transaction. Readers keep seeing the previous generation until the
//! commit publishes the new rows together with the generation row that
//! makes them live.
//!
//! Empty input: no generation row is recorded and the outcome carries no
//! range. In append mode nothing changes at all. In replace mode the old
//! rows are still deleted and their generations marked dead, so the live
//! range keeps pointing at the (now empty) predecessor span.

use crate::cancel::CancelToken;
use crate::connectors::RecordSource;
use crate::error::{CatalogError, Result};
use crate::model::types::{Dataset, IdRange, IngestMode, Language, Record};
use crate::storage::generations::{kill_older_generations, record_generation};
use crate::storage::sqlite::{CatalogStore, delete_all_rows, insert_record};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IngestOutcome {
    pub dataset: Dataset,
    pub mode: IngestMode,
    /// Assigned `(first_id, last_id)`; `None` for an empty source.
    pub range: Option<IdRange>,
    pub generation_id: Option<i64>,
    pub inserted: usize,
    /// Base rows removed up front (replace mode only).
    pub deleted: usize,
    /// Predecessor generations marked dead.
    pub killed: usize,
}

fn validate_record(record: &Record) -> Result<()> {
    if record.natural_key.trim().is_empty() {
        return Err(CatalogError::Validation("record has an empty natural key".into()));
    }
    if record.language.trim().is_empty() {
        return Err(CatalogError::Validation(format!(
            "record {} has an empty language tag",
            record.natural_key
        )));
    }
    if record.title.trim().is_empty() {
        return Err(CatalogError::Validation(format!(
            "record {} has an empty title",
            record.natural_key
        )));
    }
    Ok(())
}

/// Ingest `source` into `dataset`. All-or-nothing: any source, validation,
/// store, or cancellation error rolls the transaction back.
pub fn ingest<S>(
    store: &mut CatalogStore,
    dataset: Dataset,
    mode: IngestMode,
    source: &mut S,
    cancel: &CancelToken,
) -> Result<IngestOutcome>
where
    S: RecordSource + ?Sized,
{
    let start = Instant::now();
    info!(dataset = %dataset, ?mode, "ingest_start");

    let now = CatalogStore::now_millis();
    let tx = store.begin_write()?;

    let deleted = match mode {
        IngestMode::Replace => delete_all_rows(&tx, dataset)?,
        IngestMode::Append => 0,
    };

    let mut range: Option<IdRange> = None;
    let mut inserted = 0usize;
    let mut unindexed = 0usize;

    loop {
        if cancel.is_cancelled() {
            warn!(dataset = %dataset, inserted, "ingest cancelled, rolling back");
            return Err(CatalogError::Cancelled);
        }
        let record = match source.next_record() {
            None => break,
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!(dataset = %dataset, inserted, error = %e, "record source failed, rolling back");
                return Err(e.into());
            }
        };
        validate_record(&record)?;
        if Language::from_tag(&record.language).is_none() {
            unindexed += 1;
        }

        let id = insert_record(&tx, dataset, &record, now)?;
        range = Some(match range {
            None => IdRange {
                first_id: id,
                last_id: id,
            },
            Some(r) => IdRange {
                first_id: r.first_id,
                last_id: id,
            },
        });
        inserted += 1;
    }

    let (killed, generation_id) = match (range, mode) {
        (Some(range), _) => {
            let killed = kill_older_generations(&tx, dataset, now)?;
            (killed, Some(record_generation(&tx, dataset, range, now)?))
        }
        (None, IngestMode::Replace) => (kill_older_generations(&tx, dataset, now)?, None),
        (None, IngestMode::Append) => {
            debug!(dataset = %dataset, "empty append, nothing to record");
            (0, None)
        }
    };

    tx.commit()?;

    if unindexed > 0 {
        debug!(dataset = %dataset, unindexed, "rows stored without a language index");
    }
    info!(
        dataset = %dataset,
        ?mode,
        inserted,
        deleted,
        killed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "ingest_complete"
    );

    Ok(IngestOutcome {
        dataset,
        mode,
        range,
        generation_id,
        inserted,
        deleted,
        killed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::from_records;
    use crate::error::SourceError;

    fn titles(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(format!("a{i}"), Language::English, format!("title number {i}")))
            .collect()
    }

    #[test]
    fn replace_records_range_of_assigned_ids() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let outcome = ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Replace,
            &mut from_records(titles(4)),
            &CancelToken::new(),
        )
        .unwrap();

        let range = outcome.range.unwrap();
        assert_eq!(outcome.inserted, 4);
        assert_eq!(range.last_id - range.first_id, 3);
        assert_eq!(store.count_rows(Dataset::AnimeTitles).unwrap(), 4);
        assert_eq!(store.resolve_live_range(Dataset::AnimeTitles).unwrap(), Some(range));
    }

    #[test]
    fn validation_failure_rolls_back() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let mut records = titles(2);
        records[1].title = "   ".into();
        let err = ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Append,
            &mut from_records(records),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(store.count_rows(Dataset::AnimeTitles).unwrap(), 0);
        assert!(store.list_generations(Dataset::AnimeTitles).unwrap().is_empty());
    }

    #[test]
    fn source_error_surfaces_verbatim() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let mut source = vec![
            Ok(Record::new("a1", Language::English, "fine")),
            Err(SourceError::Malformed {
                line: 2,
                reason: "bad".into(),
            }),
        ]
        .into_iter();
        let err = ingest(
            &mut store,
            Dataset::VisualNovelTitles,
            IngestMode::Replace,
            &mut source,
            &CancelToken::new(),
        )
        .unwrap_err();
        match err {
            CatalogError::Source(SourceError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.count_rows(Dataset::VisualNovelTitles).unwrap(), 0);
    }

    #[test]
    fn cancelled_ingest_leaves_store_untouched() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Replace,
            &mut from_records(titles(3)),
            &CancelToken::new(),
        )
        .unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Replace,
            &mut from_records(titles(5)),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Cancelled));
        assert_eq!(store.count_rows(Dataset::AnimeTitles).unwrap(), 3);
        assert_eq!(store.list_generations(Dataset::AnimeTitles).unwrap().len(), 1);
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let mut store = CatalogStore::open_in_memory().unwrap();
        let first = ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Append,
            &mut from_records(titles(2)),
            &CancelToken::new(),
        )
        .unwrap();
        let empty = ingest(
            &mut store,
            Dataset::AnimeTitles,
            IngestMode::Append,
            &mut from_records(Vec::new()),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(empty.range, None);
        assert_eq!(empty.generation_id, None);
        assert_eq!(empty.killed, 0);
        assert_eq!(
            store.resolve_live_range(Dataset::AnimeTitles).unwrap(),
            first.range
        );
    }
}
