//! `SQLite` backend: schema, pragmas, migrations, and row access.

use crate::error::{CatalogError, Result};
use crate::model::types::{Dataset, Language, Record, StoredRecord, TitleKind};
use crate::search::fts::index_ddl;
use rusqlite::{
    Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params,
};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};
use url::Url;

/// Public schema version constant for external checks.
pub const CURRENT_SCHEMA_VERSION: i64 = SCHEMA_VERSION;

const SCHEMA_VERSION: i64 = 1;

const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dataset TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    first_id INTEGER NOT NULL,
    last_id INTEGER NOT NULL,
    dead INTEGER NOT NULL DEFAULT 0,
    dead_at INTEGER,
    reclaimed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_generations_dataset
    ON generations(dataset, id DESC);
";

/// Base and child tables for one dataset, plus its per-language indexes.
fn dataset_ddl(dataset: Dataset) -> String {
    let entries = dataset.entries_table();
    let synonyms = dataset.synonyms_table();
    let relations = dataset.relations_table();
    let tags = dataset.tags_table();
    let sources = dataset.sources_table();
    let mut ddl = format!(
        "CREATE TABLE IF NOT EXISTS {entries} (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             natural_key TEXT NOT NULL,
             language TEXT NOT NULL,
             title TEXT NOT NULL,
             kind TEXT NOT NULL,
             official INTEGER NOT NULL,
             inserted_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{entries}_natural_key ON {entries}(natural_key);

         CREATE TABLE IF NOT EXISTS {synonyms} (
             id INTEGER PRIMARY KEY,
             entry_id INTEGER NOT NULL REFERENCES {entries}(id),
             synonym TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{synonyms}_entry ON {synonyms}(entry_id);

         CREATE TABLE IF NOT EXISTS {tags} (
             id INTEGER PRIMARY KEY,
             entry_id INTEGER NOT NULL REFERENCES {entries}(id),
             tag TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{tags}_entry ON {tags}(entry_id);

         CREATE TABLE IF NOT EXISTS {relations} (
             id INTEGER PRIMARY KEY,
             entry_id INTEGER NOT NULL REFERENCES {entries}(id),
             relation TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{relations}_entry ON {relations}(entry_id);

         CREATE TABLE IF NOT EXISTS {sources} (
             id INTEGER PRIMARY KEY,
             entry_id INTEGER NOT NULL REFERENCES {entries}(id),
             source_name TEXT NOT NULL,
             source_url TEXT NOT NULL,
             source_id TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_{sources}_entry ON {sources}(entry_id);
        "
    );
    for language in Language::CASCADE {
        ddl.push_str(&index_ddl(dataset, language));
        ddl.push('\n');
    }
    ddl
}

/// Explicit store handle. Each handle owns one connection; independent
/// handles on the same file serve concurrent readers.
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                CatalogError::Config(format!("creating db directory {}: {e}", parent.display()))
            })?;
        }

        let mut conn = Connection::open(path)?;
        apply_pragmas(&mut conn)?;
        init_meta(&mut conn)?;
        migrate(&mut conn)?;
        info!(path = %path.display(), "opened catalog store");

        Ok(Self { conn })
    }

    /// Reader handle. Fails when the file does not exist.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_common_pragmas(&conn)?;
        Ok(Self { conn })
    }

    /// Private store that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        apply_common_pragmas(&conn)?;
        init_meta(&mut conn)?;
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn raw(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT value FROM meta WHERE key='schema_version'",
                [],
                |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("schema_version"))
    }

    /// Write transaction that takes the write lock up front so a second
    /// writer waits on the busy timeout instead of failing mid-way.
    pub(crate) fn begin_write(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Read snapshot spanning several statements.
    pub(crate) fn begin_read(&self) -> Result<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    pub fn get_by_id(&self, dataset: Dataset, id: i64) -> Result<StoredRecord> {
        fetch_record(&self.conn, dataset, id)?.ok_or_else(|| {
            debug!(dataset = %dataset, id, "record lookup missed");
            CatalogError::not_found(format!("{dataset} record {id}"))
        })
    }

    /// Every row carrying `natural_key`, newest first. Rows of dead
    /// generations that have not been swept yet are included.
    pub fn get_by_natural_key(&self, dataset: Dataset, natural_key: &str) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT id FROM {} WHERE natural_key = ? ORDER BY id DESC",
            dataset.entries_table()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![natural_key], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rec) = fetch_record(&self.conn, dataset, id)? {
                records.push(rec);
            }
        }
        if records.is_empty() {
            debug!(dataset = %dataset, natural_key, "natural key lookup missed");
            return Err(CatalogError::not_found(format!(
                "{dataset} record with key {natural_key}"
            )));
        }
        Ok(records)
    }

    pub fn count_rows(&self, dataset: Dataset) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", dataset.entries_table());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Get current time as milliseconds since epoch.
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

pub(crate) fn fetch_record(conn: &Connection, dataset: Dataset, id: i64) -> Result<Option<StoredRecord>> {
    let sql = format!(
        "SELECT id, natural_key, language, title, kind, official, inserted_at FROM {} WHERE id = ?",
        dataset.entries_table()
    );
    let base = conn
        .query_row(&sql, params![id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })
        .optional()?;

    let Some((id, natural_key, language, title, kind, official, inserted_at)) = base else {
        return Ok(None);
    };
    let kind: TitleKind = kind
        .parse()
        .map_err(|e: String| CatalogError::Validation(format!("row {id}: {e}")))?;

    Ok(Some(StoredRecord {
        id,
        inserted_at,
        record: Record {
            natural_key,
            language,
            title,
            kind,
            official,
            synonyms: fetch_children(conn, dataset.synonyms_table(), "synonym", id)?,
            relations: fetch_children(conn, dataset.relations_table(), "relation", id)?,
            tags: fetch_children(conn, dataset.tags_table(), "tag", id)?,
            sources: fetch_children(conn, dataset.sources_table(), "source_url", id)?,
        },
    }))
}

fn fetch_children(conn: &Connection, table: &str, column: &str, entry_id: i64) -> Result<Vec<String>> {
    let sql = format!("SELECT {column} FROM {table} WHERE entry_id = ? ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![entry_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Insert one record and its child rows. Returns the assigned id.
///
/// The parent goes in first so its id can be referenced by the children.
pub(crate) fn insert_record(
    tx: &Transaction<'_>,
    dataset: Dataset,
    record: &Record,
    inserted_at: i64,
) -> Result<i64> {
    let sql = format!(
        "INSERT INTO {}(natural_key, language, title, kind, official, inserted_at)
         VALUES(?,?,?,?,?,?)",
        dataset.entries_table()
    );
    tx.prepare_cached(&sql)?.execute(params![
        record.natural_key,
        record.language,
        record.title,
        record.kind.as_str(),
        record.official,
        inserted_at,
    ])?;
    let id = tx.last_insert_rowid();

    insert_children(tx, dataset.synonyms_table(), "synonym", id, &record.synonyms)?;
    insert_children(tx, dataset.relations_table(), "relation", id, &record.relations)?;
    insert_children(tx, dataset.tags_table(), "tag", id, &record.tags)?;

    if !record.sources.is_empty() {
        let sql = format!(
            "INSERT INTO {}(entry_id, source_name, source_url, source_id) VALUES(?,?,?,?)",
            dataset.sources_table()
        );
        let mut stmt = tx.prepare_cached(&sql)?;
        for source in &record.sources {
            let (name, source_id) = split_source(source).map_err(|reason| {
                CatalogError::Validation(format!(
                    "record {}: source `{source}`: {reason}",
                    record.natural_key
                ))
            })?;
            stmt.execute(params![id, name, source, source_id])?;
        }
    }
    Ok(id)
}

fn insert_children(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    entry_id: i64,
    values: &[String],
) -> Result<()> {
    if values.is_empty() {
        return Ok(());
    }
    let sql = format!("INSERT INTO {table}(entry_id, {column}) VALUES(?,?)");
    let mut stmt = tx.prepare_cached(&sql)?;
    for value in values {
        stmt.execute(params![entry_id, value])?;
    }
    Ok(())
}

/// Host and last path segment of a source URL, e.g.
/// `https://anidb.net/anime/4563` gives `("anidb.net", "4563")`.
pub(crate) fn split_source(source: &str) -> std::result::Result<(String, String), String> {
    let url = Url::parse(source).map_err(|e| e.to_string())?;
    let host = url
        .host_str()
        .ok_or_else(|| "url has no host".to_string())?
        .to_string();
    let path = url.path();
    let source_id = path.rsplit('/').next().unwrap_or(path).to_string();
    Ok((host, source_id))
}

/// Delete every base and child row of `dataset`. Index rows follow through
/// the delete hooks. Returns the number of base rows removed.
pub(crate) fn delete_all_rows(tx: &Transaction<'_>, dataset: Dataset) -> Result<usize> {
    for child in dataset.child_tables() {
        tx.execute(&format!("DELETE FROM {child}"), [])?;
    }
    Ok(tx.execute(&format!("DELETE FROM {}", dataset.entries_table()), [])?)
}

/// Delete base and child rows whose id falls in `[first_id, last_id]`.
/// Rows already gone are skipped, so repeating the call is harmless.
pub(crate) fn delete_id_range(
    tx: &Transaction<'_>,
    dataset: Dataset,
    first_id: i64,
    last_id: i64,
) -> Result<usize> {
    for child in dataset.child_tables() {
        tx.execute(
            &format!("DELETE FROM {child} WHERE entry_id BETWEEN ?1 AND ?2"),
            params![first_id, last_id],
        )?;
    }
    Ok(tx.execute(
        &format!(
            "DELETE FROM {} WHERE id BETWEEN ?1 AND ?2",
            dataset.entries_table()
        ),
        params![first_id, last_id],
    )?)
}

fn apply_pragmas(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        ",
    )?;
    apply_common_pragmas(conn)
}

fn apply_common_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA temp_store = MEMORY;
        PRAGMA cache_size = -65536; -- 64MB
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

fn init_meta(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?;

    if existing.is_none() {
        // Start at version 0 so migrate() applies full schema on first open.
        conn.execute(
            "INSERT INTO meta(key, value) VALUES('schema_version', '0')",
            [],
        )?;
    }

    Ok(())
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?
        .unwrap_or(0);

    if current == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;

    match current {
        0 => {
            tx.execute_batch(MIGRATION_V1)?;
            for dataset in Dataset::ALL {
                tx.execute_batch(&dataset_ddl(dataset))?;
            }
        }
        v => {
            return Err(CatalogError::Config(format!(
                "schema version {v} is not supported (expected {SCHEMA_VERSION})"
            )));
        }
    }

    tx.execute(
        "UPDATE meta SET value = ? WHERE key = 'schema_version'",
        params![SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()?;
    info!(from = current, to = SCHEMA_VERSION, "schema migrated");

    Ok(())
}
