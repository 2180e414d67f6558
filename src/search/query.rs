use std::collections::HashMap;

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CatalogError, Result};
use crate::model::types::{Dataset, IdRange, Language, StoredRecord};
use crate::search::fts::{build_ranked_match_sql, escape_match_query, validate_query};
use crate::search::rank::{CorpusFrequencyRank, RankPolicy, score_blob};
use crate::storage::generations::resolve_live_range;
use crate::storage::sqlite::{CatalogStore, fetch_record};

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// Index the hit came from; the record's own tag stays under `language`.
    #[serde(rename = "index")]
    pub language: Language,
    pub score: f64,
    #[serde(flatten)]
    pub record: StoredRecord,
}

/// Hits from a cascading search plus the languages that were actually
/// queried, in order.
#[derive(Debug, Clone, Serialize)]
pub struct CascadeOutcome {
    pub hits: Vec<SearchHit>,
    pub queried: Vec<Language>,
}

/// One physical text index.
#[derive(Debug, Clone)]
pub struct IndexRoute {
    pub table: &'static str,
    match_sql: String,
}

/// Every (dataset, language) index and its prepared query text, built once
/// from the closed configuration sets.
#[derive(Debug, Clone)]
pub struct IndexRouter {
    routes: HashMap<(Dataset, Language), IndexRoute>,
}

impl Default for IndexRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexRouter {
    pub fn new() -> Self {
        let mut routes = HashMap::new();
        for dataset in Dataset::ALL {
            for language in Language::CASCADE {
                routes.insert(
                    (dataset, language),
                    IndexRoute {
                        table: dataset.fts_table(language),
                        match_sql: build_ranked_match_sql(dataset, language),
                    },
                );
            }
        }
        Self { routes }
    }

    pub fn route(&self, dataset: Dataset, language: Language) -> &IndexRoute {
        // Every pair is inserted in `new`.
        &self.routes[&(dataset, language)]
    }

    /// Ranked `(id, score)` pairs for `match_expr` inside `range`, best
    /// first. A malformed statistics blob fails the whole call.
    fn ranked_ids(
        &self,
        conn: &Connection,
        policy: &dyn RankPolicy,
        dataset: Dataset,
        language: Language,
        match_expr: &str,
        range: IdRange,
    ) -> Result<Vec<(i64, f64)>> {
        let route = self.route(dataset, language);
        let mut stmt = conn.prepare_cached(&route.match_sql)?;
        let mut rows = stmt.query(params![match_expr, range.first_id, range.last_id])?;

        let mut scored = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            let score = score_blob(policy, &blob).map_err(|e| {
                CatalogError::Validation(format!("{} docid {id}: {e}", route.table))
            })?;
            scored.push((id, score));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(scored)
    }
}

/// Read-side surface: ranked search, cascading search, and point lookups.
pub struct QueryService<'a> {
    store: &'a CatalogStore,
    router: IndexRouter,
    policy: Box<dyn RankPolicy>,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a CatalogStore) -> Self {
        Self::with_policy(store, Box::new(CorpusFrequencyRank))
    }

    pub fn with_policy(store: &'a CatalogStore, policy: Box<dyn RankPolicy>) -> Self {
        Self {
            store,
            router: IndexRouter::new(),
            policy,
        }
    }

    /// Ranked search over one language index, restricted to the live range.
    pub fn search(
        &self,
        dataset: Dataset,
        language: Language,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(query) = validate_query(query) else {
            return Ok(Vec::new());
        };
        info!(dataset = %dataset, language = %language, query = %query, limit, "search_start");

        let snapshot = self.store.begin_read()?;
        let hits = self.search_in(&snapshot, dataset, language, &escape_match_query(&query), limit)?;
        snapshot.finish()?;
        Ok(hits)
    }

    /// Try languages in cascade order, stopping once `limit` hits have
    /// accumulated. Results are concatenated per language, not re-ranked.
    pub fn cascading_search(&self, dataset: Dataset, query: &str, limit: usize) -> Result<CascadeOutcome> {
        let mut outcome = CascadeOutcome {
            hits: Vec::new(),
            queried: Vec::new(),
        };
        let Some(query) = validate_query(query) else {
            return Ok(outcome);
        };
        info!(dataset = %dataset, query = %query, limit, "cascading_search_start");

        let match_expr = escape_match_query(&query);
        let snapshot = self.store.begin_read()?;
        for language in Language::CASCADE {
            if outcome.hits.len() >= limit {
                debug!(
                    dataset = %dataset,
                    hits = outcome.hits.len(),
                    skipped_from = %language,
                    "cascade_stop"
                );
                break;
            }
            let remaining = limit - outcome.hits.len();
            outcome.queried.push(language);
            outcome
                .hits
                .extend(self.search_in(&snapshot, dataset, language, &match_expr, remaining)?);
        }
        snapshot.finish()?;

        outcome.hits.truncate(limit);
        Ok(outcome)
    }

    fn search_in(
        &self,
        conn: &Connection,
        dataset: Dataset,
        language: Language,
        match_expr: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(range) = resolve_live_range(conn, dataset)? else {
            debug!(dataset = %dataset, "no live range, nothing to search");
            return Ok(Vec::new());
        };

        let mut ranked =
            self.router
                .ranked_ids(conn, self.policy.as_ref(), dataset, language, match_expr, range)?;
        ranked.truncate(limit);

        let mut hits = Vec::with_capacity(ranked.len());
        for (id, score) in ranked {
            let record = fetch_record(conn, dataset, id)?.ok_or_else(|| {
                CatalogError::Validation(format!("index row {id} has no {dataset} record"))
            })?;
            hits.push(SearchHit {
                language,
                score,
                record,
            });
        }
        Ok(hits)
    }

    /// Direct lookup; ignores ranking and the live range.
    pub fn get_by_id(&self, dataset: Dataset, id: i64) -> Result<StoredRecord> {
        self.store.get_by_id(dataset, id)
    }

    /// Direct lookup; may return rows of dead generations not yet swept.
    pub fn get_by_natural_key(&self, dataset: Dataset, natural_key: &str) -> Result<Vec<StoredRecord>> {
        self.store.get_by_natural_key(dataset, natural_key)
    }
}
