//! Full-text query utilities.
//!
//! Table names come only from [`Dataset`] / [`Language`]; user text is
//! escaped into quoted phrases and bound as a parameter.

use crate::model::types::{Dataset, Language};

/// Escape a query string for safe use with MATCH.
///
/// Each whitespace-separated term becomes a double-quoted phrase with
/// internal quotes doubled, so operators and column filters in user input
/// are matched literally. Adjacent phrases are implicitly AND-ed.
///
/// ```
/// use catalog_search::search::fts::escape_match_query;
///
/// assert_eq!(escape_match_query("hello world"), r#""hello" "world""#);
/// assert_eq!(escape_match_query("foo\"bar"), r#""foo""bar""#);
/// ```
pub fn escape_match_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed query, or `None` when there is nothing to search for.
pub fn validate_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Ranked-match SQL for one (dataset, language) index, restricted to a live
/// id range. Yields `(docid, matchinfo blob)` pairs; records are loaded by id
/// afterwards.
///
/// Parameters: `?1` MATCH expression, `?2` first id, `?3` last id.
///
/// ```sql
/// SELECT docid, matchinfo(anime_en_fts, 'pcx')
/// FROM anime_en_fts
/// WHERE anime_en_fts MATCH ?1
///   AND docid BETWEEN ?2 AND ?3
/// ```
pub fn build_ranked_match_sql(dataset: Dataset, language: Language) -> String {
    let fts = dataset.fts_table(language);
    format!(
        "SELECT docid, matchinfo({fts}, 'pcx')
         FROM {fts}
         WHERE {fts} MATCH ?1
           AND docid BETWEEN ?2 AND ?3"
    )
}

/// DDL for one language index plus the hooks that keep it in sync with the
/// base table.
pub fn index_ddl(dataset: Dataset, language: Language) -> String {
    let fts = dataset.fts_table(language);
    let entries = dataset.entries_table();
    let tag = language.tag();
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts4(title, tokenize=unicode61);
         CREATE TRIGGER IF NOT EXISTS {fts}_ai AFTER INSERT ON {entries}
             WHEN new.language = '{tag}'
         BEGIN
             INSERT INTO {fts}(docid, title) VALUES (new.id, new.title);
         END;
         CREATE TRIGGER IF NOT EXISTS {fts}_ad AFTER DELETE ON {entries}
             WHEN old.language = '{tag}'
         BEGIN
             DELETE FROM {fts} WHERE docid = old.id;
         END;"
    )
}
