//! Relevance ranking over `matchinfo(..., 'pcx')` blobs.
//!
//! The blob is two little-endian `u32` header words (phrase count, column
//! count) followed by `phrases * columns` triples of little-endian `u32`:
//! `[hits_in_row, hits_in_all_rows, rows_with_hits]`, phrase-major. The
//! third word is not used for scoring.

use thiserror::Error;

const HEADER_LEN: usize = 8;
const TRIPLE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchInfoError {
    #[error("match statistics blob is {len} bytes, shorter than the {HEADER_LEN}-byte header")]
    MissingHeader { len: usize },
    #[error(
        "match statistics blob declares {phrases} phrases x {columns} columns \
         ({expected} bytes) but holds {len} bytes"
    )]
    Truncated {
        phrases: u32,
        columns: u32,
        expected: usize,
        len: usize,
    },
    #[error("match statistics dimensions {phrases} x {columns} overflow")]
    Overflow { phrases: u32, columns: u32 },
    #[error(
        "phrase {phrase} column {column}: {in_document} local hits exceed {in_corpus} corpus hits"
    )]
    Inconsistent {
        phrase: u32,
        column: u32,
        in_document: u32,
        in_corpus: u32,
    },
}

/// Per phrase/column hit counts for one matched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseHits {
    pub in_document: u32,
    pub in_corpus: u32,
}

/// Decoded view over a match-statistics blob.
///
/// Construction validates the full length up front, so accessors never
/// index past the end of the buffer. A cell whose local hits exceed its
/// corpus hits is rejected as well.
#[derive(Debug, Clone, Copy)]
pub struct MatchInfo<'a> {
    phrases: u32,
    columns: u32,
    triples: &'a [u8],
}

impl<'a> MatchInfo<'a> {
    pub fn decode(blob: &'a [u8]) -> Result<Self, MatchInfoError> {
        if blob.len() < HEADER_LEN {
            return Err(MatchInfoError::MissingHeader { len: blob.len() });
        }
        let phrases = read_u32(blob, 0);
        let columns = read_u32(blob, 4);

        let expected = (phrases as usize)
            .checked_mul(columns as usize)
            .and_then(|n| n.checked_mul(TRIPLE_LEN))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or(MatchInfoError::Overflow { phrases, columns })?;

        if blob.len() < expected {
            return Err(MatchInfoError::Truncated {
                phrases,
                columns,
                expected,
                len: blob.len(),
            });
        }

        let info = Self {
            phrases,
            columns,
            triples: &blob[HEADER_LEN..expected],
        };
        for (i, cell) in info.cells().enumerate() {
            if cell.in_document > cell.in_corpus {
                let columns = columns as usize;
                return Err(MatchInfoError::Inconsistent {
                    phrase: (i / columns) as u32,
                    column: (i % columns) as u32,
                    in_document: cell.in_document,
                    in_corpus: cell.in_corpus,
                });
            }
        }
        Ok(info)
    }

    pub fn phrase_count(&self) -> u32 {
        self.phrases
    }

    pub fn column_count(&self) -> u32 {
        self.columns
    }

    /// Hits for `phrase` in `column`, or `None` when out of range.
    pub fn hits(&self, phrase: u32, column: u32) -> Option<PhraseHits> {
        if phrase >= self.phrases || column >= self.columns {
            return None;
        }
        let offset = ((phrase as usize) * (self.columns as usize) + column as usize) * TRIPLE_LEN;
        Some(PhraseHits {
            in_document: read_u32(self.triples, offset),
            in_corpus: read_u32(self.triples, offset + 4),
        })
    }

    /// Every `(phrase, column)` cell in phrase-major order.
    pub fn cells(&self) -> impl Iterator<Item = PhraseHits> + '_ {
        self.triples.chunks_exact(TRIPLE_LEN).map(|t| PhraseHits {
            in_document: read_u32(t, 0),
            in_corpus: read_u32(t, 4),
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(word)
}

/// Scoring policy applied to a decoded blob. Higher ranks first.
pub trait RankPolicy: Send + Sync {
    fn score(&self, info: &MatchInfo<'_>) -> f64;
}

/// Sum of `hits_in_row / hits_in_all_rows` over every cell that matched:
/// globally rare terms weigh more per local hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusFrequencyRank;

impl RankPolicy for CorpusFrequencyRank {
    fn score(&self, info: &MatchInfo<'_>) -> f64 {
        info.cells()
            .filter(|h| h.in_document > 0)
            .map(|h| f64::from(h.in_document) / f64::from(h.in_corpus))
            .sum()
    }
}

/// Decode `blob` and score it with `policy`.
pub fn score_blob(policy: &dyn RankPolicy, blob: &[u8]) -> Result<f64, MatchInfoError> {
    let info = MatchInfo::decode(blob)?;
    Ok(policy.score(&info))
}

#[cfg(test)]
pub(crate) fn encode_blob(phrases: u32, columns: u32, words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + words.len() * 4);
    out.extend_from_slice(&phrases.to_le_bytes());
    out.extend_from_slice(&columns.to_le_bytes());
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}
