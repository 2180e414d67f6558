//! Normalized entity structs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical record collections known to the store.
///
/// Every table name the crate ever puts into SQL text is derived from this
/// closed set, never from caller input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    AnimeTitles,
    VisualNovelTitles,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::AnimeTitles, Dataset::VisualNovelTitles];

    /// Stable identifier persisted in `generations.dataset`.
    pub fn slug(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime-titles",
            Dataset::VisualNovelTitles => "vn-titles",
        }
    }

    pub fn entries_table(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime_entries",
            Dataset::VisualNovelTitles => "vn_entries",
        }
    }

    pub fn synonyms_table(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime_synonyms",
            Dataset::VisualNovelTitles => "vn_synonyms",
        }
    }

    pub fn tags_table(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime_tags",
            Dataset::VisualNovelTitles => "vn_tags",
        }
    }

    pub fn relations_table(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime_relations",
            Dataset::VisualNovelTitles => "vn_relations",
        }
    }

    pub fn sources_table(self) -> &'static str {
        match self {
            Dataset::AnimeTitles => "anime_sources",
            Dataset::VisualNovelTitles => "vn_sources",
        }
    }

    /// Child tables in deletion order. Each references `entry_id`.
    pub fn child_tables(self) -> [&'static str; 4] {
        [
            self.synonyms_table(),
            self.relations_table(),
            self.tags_table(),
            self.sources_table(),
        ]
    }

    /// Full-text table holding `language` titles for this dataset.
    pub fn fts_table(self, language: Language) -> &'static str {
        match (self, language) {
            (Dataset::AnimeTitles, Language::Japanese) => "anime_ja_fts",
            (Dataset::AnimeTitles, Language::English) => "anime_en_fts",
            (Dataset::AnimeTitles, Language::Romaji) => "anime_xjat_fts",
            (Dataset::VisualNovelTitles, Language::Japanese) => "vn_ja_fts",
            (Dataset::VisualNovelTitles, Language::English) => "vn_en_fts",
            (Dataset::VisualNovelTitles, Language::Romaji) => "vn_xjat_fts",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .into_iter()
            .find(|d| d.slug() == s)
            .ok_or_else(|| format!("unknown dataset `{s}`"))
    }
}

/// Languages that get their own text index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Japanese,
    English,
    /// Romanized (transliterated) titles.
    Romaji,
}

impl Language {
    /// Cascade priority: native script, then the international language,
    /// then the transliterated fallback.
    pub const CASCADE: [Language; 3] = [Language::Japanese, Language::English, Language::Romaji];

    pub fn tag(self) -> &'static str {
        match self {
            Language::Japanese => "ja",
            Language::English => "en",
            Language::Romaji => "x-jat",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Language::CASCADE.into_iter().find(|l| l.tag() == tag)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_tag(s).ok_or_else(|| format!("unknown language tag `{s}`"))
    }
}

/// How an ingest treats data already present for the dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    Replace,
    Append,
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(IngestMode::Replace),
            "append" => Ok(IngestMode::Append),
            other => Err(format!("unknown ingest mode `{other}`")),
        }
    }
}

/// Title classification carried by the upstream dumps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TitleKind {
    Primary,
    Official,
    Synonym,
    Short,
}

impl TitleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TitleKind::Primary => "primary",
            TitleKind::Official => "official",
            TitleKind::Synonym => "synonym",
            TitleKind::Short => "short",
        }
    }
}

impl FromStr for TitleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(TitleKind::Primary),
            "official" => Ok(TitleKind::Official),
            "synonym" => Ok(TitleKind::Synonym),
            "short" => Ok(TitleKind::Short),
            other => Err(format!("unknown title kind `{other}`")),
        }
    }
}

/// One catalog entry as produced by a record source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Identifier in the upstream catalog (e.g. `a1234`, `v17`).
    pub natural_key: String,
    /// Language tag; only the tags in [`Language`] are indexed.
    pub language: String,
    pub title: String,
    pub kind: TitleKind,
    pub official: bool,
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Links to related entries in the upstream catalog.
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Absolute URLs of the catalog pages this entry was merged from.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Record {
    pub fn new(natural_key: impl Into<String>, language: Language, title: impl Into<String>) -> Self {
        Self {
            natural_key: natural_key.into(),
            language: language.tag().to_string(),
            title: title.into(),
            kind: TitleKind::Official,
            official: true,
            synonyms: Vec::new(),
            relations: Vec::new(),
            tags: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// A record as persisted, with its store-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: i64,
    pub inserted_at: i64,
    #[serde(flatten)]
    pub record: Record,
}

/// Inclusive id span of one ingest batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdRange {
    pub first_id: i64,
    pub last_id: i64,
}

impl IdRange {
    pub fn contains(&self, id: i64) -> bool {
        id >= self.first_id && id <= self.last_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationState {
    Alive,
    DeadPendingReclaim,
    Reclaimed,
}

/// Metadata row describing one ingest batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Generation {
    pub id: i64,
    pub dataset: Dataset,
    pub created_at: i64,
    pub range: IdRange,
    pub dead: bool,
    pub dead_at: Option<i64>,
    pub reclaimed_at: Option<i64>,
}

impl Generation {
    pub fn state(&self) -> GenerationState {
        match (self.dead, self.reclaimed_at) {
            (_, Some(_)) => GenerationState::Reclaimed,
            (true, None) => GenerationState::DeadPendingReclaim,
            (false, None) => GenerationState::Alive,
        }
    }
}
