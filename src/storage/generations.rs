//! Generation tracking: which id span of a dataset is authoritative for
//! ranked search, and when superseded spans may be physically reclaimed.
//!
//! Each ingest batch is one generation. States move
//! `alive -> dead-pending-reclaim -> reclaimed`; only [`CatalogStore::sweep_expired`]
//! performs the last transition. The most recently created generation of a
//! dataset is the live one, whatever its flag, and is never reclaimed.

use crate::cancel::CancelToken;
use crate::error::{CatalogError, Result};
use crate::model::types::{Dataset, Generation, IdRange};
use crate::storage::sqlite::{CatalogStore, delete_id_range};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub reclaimed_generations: usize,
    pub deleted_rows: usize,
}

/// Persist a finalized generation inside the ingest transaction.
pub fn record_generation(
    tx: &Transaction<'_>,
    dataset: Dataset,
    range: IdRange,
    created_at: i64,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO generations(dataset, created_at, first_id, last_id, dead)
         VALUES(?,?,?,?,0)",
        params![dataset.slug(), created_at, range.first_id, range.last_id],
    )?;
    let id = tx.last_insert_rowid();
    info!(
        dataset = %dataset,
        generation = id,
        first_id = range.first_id,
        last_id = range.last_id,
        "generation_recorded"
    );
    Ok(id)
}

/// Mark every alive generation of `dataset` dead. Metadata only; rows stay
/// until a sweep reclaims them.
pub fn kill_older_generations(conn: &Connection, dataset: Dataset, now: i64) -> Result<usize> {
    let killed = conn.execute(
        "UPDATE generations SET dead = 1, dead_at = ?2 WHERE dataset = ?1 AND dead = 0",
        params![dataset.slug(), now],
    )?;
    if killed > 0 {
        info!(dataset = %dataset, killed, "generations_killed");
    }
    Ok(killed)
}

/// The id range ranked search is restricted to.
///
/// This is the range of the most recently created generation, alive or not.
/// Before any generation exists the physical min/max id of the base table is
/// used; `None` means there is nothing to search.
pub fn resolve_live_range(conn: &Connection, dataset: Dataset) -> Result<Option<IdRange>> {
    let newest = conn
        .query_row(
            "SELECT first_id, last_id FROM generations
             WHERE dataset = ? ORDER BY id DESC LIMIT 1",
            params![dataset.slug()],
            |row| {
                Ok(IdRange {
                    first_id: row.get(0)?,
                    last_id: row.get(1)?,
                })
            },
        )
        .optional()?;
    if newest.is_some() {
        return Ok(newest);
    }

    let (min, max): (Option<i64>, Option<i64>) = conn.query_row(
        &format!("SELECT MIN(id), MAX(id) FROM {}", dataset.entries_table()),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(min.zip(max).map(|(first_id, last_id)| IdRange { first_id, last_id }))
}

pub fn list_generations(conn: &Connection, dataset: Dataset) -> Result<Vec<Generation>> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, first_id, last_id, dead, dead_at, reclaimed_at
         FROM generations WHERE dataset = ? ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![dataset.slug()], |row| generation_from_row(dataset, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn generation_from_row(dataset: Dataset, row: &Row<'_>) -> rusqlite::Result<Generation> {
    Ok(Generation {
        id: row.get(0)?,
        dataset,
        created_at: row.get(1)?,
        range: IdRange {
            first_id: row.get(2)?,
            last_id: row.get(3)?,
        },
        dead: row.get(4)?,
        dead_at: row.get(5)?,
        reclaimed_at: row.get(6)?,
    })
}

/// Dead, unreclaimed generations of `dataset` whose death is at least
/// `retention_ms` old, excluding the newest generation.
fn expired_generations(
    tx: &Transaction<'_>,
    dataset: Dataset,
    now: i64,
    retention_ms: i64,
) -> Result<Vec<Generation>> {
    let mut stmt = tx.prepare(
        "SELECT id, created_at, first_id, last_id, dead, dead_at, reclaimed_at
         FROM generations
         WHERE dataset = ?1
           AND dead = 1
           AND reclaimed_at IS NULL
           AND dead_at <= ?2
           AND id < (SELECT MAX(id) FROM generations WHERE dataset = ?1)
         ORDER BY id",
    )?;
    let cutoff = now.saturating_sub(retention_ms);
    let rows = stmt
        .query_map(params![dataset.slug(), cutoff], |row| {
            generation_from_row(dataset, row)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

impl CatalogStore {
    pub fn resolve_live_range(&self, dataset: Dataset) -> Result<Option<IdRange>> {
        resolve_live_range(self.raw(), dataset)
    }

    pub fn list_generations(&self, dataset: Dataset) -> Result<Vec<Generation>> {
        list_generations(self.raw(), dataset)
    }

    /// Standalone kill in its own transaction.
    pub fn kill_older_generations(&mut self, dataset: Dataset) -> Result<usize> {
        let tx = self.begin_write()?;
        let killed = kill_older_generations(&tx, dataset, Self::now_millis())?;
        tx.commit()?;
        Ok(killed)
    }

    /// Physically delete rows of generations that have been dead for longer
    /// than `retention` and mark them reclaimed. One transaction for all
    /// datasets; a failure or cancellation leaves everything unchanged and
    /// the next sweep starts over.
    pub fn sweep_expired(&mut self, retention: Duration, cancel: &CancelToken) -> Result<SweepReport> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let now = Self::now_millis();
        let tx = self.begin_write()?;
        let mut report = SweepReport::default();

        for dataset in Dataset::ALL {
            for generation in expired_generations(&tx, dataset, now, retention_ms)? {
                if cancel.is_cancelled() {
                    debug!(dataset = %dataset, "sweep cancelled, rolling back");
                    return Err(CatalogError::Cancelled);
                }
                let deleted = delete_id_range(
                    &tx,
                    dataset,
                    generation.range.first_id,
                    generation.range.last_id,
                )?;
                tx.execute(
                    "UPDATE generations SET reclaimed_at = ? WHERE id = ?",
                    params![now, generation.id],
                )?;
                info!(
                    dataset = %dataset,
                    generation = generation.id,
                    deleted,
                    "generation_reclaimed"
                );
                report.reclaimed_generations += 1;
                report.deleted_rows += deleted;
            }
        }

        tx.commit()?;
        info!(
            reclaimed = report.reclaimed_generations,
            deleted_rows = report.deleted_rows,
            "sweep_complete"
        );
        Ok(report)
    }
}
