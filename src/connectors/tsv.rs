//! Tab-separated title dumps.
//!
//! One record per line:
//!
//! ```text
//! key<TAB>lang<TAB>kind<TAB>official(t|f)<TAB>title[<TAB>synonyms[<TAB>tags[<TAB>relations[<TAB>sources]]]]
//! ```
//!
//! List columns are `|`-separated; relations and sources hold URLs. Blank lines and lines starting with
//! `#` are skipped.

use crate::error::SourceError;
use crate::model::types::{Record, TitleKind};
use std::io::{BufRead, Lines};

const REQUIRED_COLUMNS: usize = 5;
const MAX_COLUMNS: usize = 9;

pub struct TsvRecordDecoder<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: BufRead> TsvRecordDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Malformed {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn decode(&self, text: &str) -> Result<Record, SourceError> {
        let cols: Vec<&str> = text.splitn(MAX_COLUMNS, '\t').collect();
        if cols.len() < REQUIRED_COLUMNS {
            return Err(self.malformed(format!(
                "expected at least {REQUIRED_COLUMNS} columns, found {}",
                cols.len()
            )));
        }

        let kind: TitleKind = cols[2].parse().map_err(|e: String| self.malformed(e))?;
        let official = match cols[3] {
            "t" => true,
            "f" => false,
            other => return Err(self.malformed(format!("invalid official flag `{other}`"))),
        };

        Ok(Record {
            natural_key: cols[0].to_string(),
            language: cols[1].to_string(),
            kind,
            official,
            title: cols[4].to_string(),
            synonyms: split_list(cols.get(5).copied()),
            tags: split_list(cols.get(6).copied()),
            relations: split_list(cols.get(7).copied()),
            sources: split_list(cols.get(8).copied()),
        })
    }
}

fn split_list(col: Option<&str>) -> Vec<String> {
    col.map(|c| {
        c.split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl<R: BufRead> Iterator for TsvRecordDecoder<R> {
    type Item = Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(SourceError::Io(e))),
            };
            self.line += 1;

            let trimmed = text.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return Some(self.decode(&text));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_lines_and_skips_comments() {
        let input = "# dump header\n\
                     a1\tja\tofficial\tt\tカウボーイ ビバップ\n\
                     \n\
                     a1\ten\tsynonym\tf\tCowboy Bebop\tCB|Bebop\tspace|noir\n";
        let records: Vec<_> = TsvRecordDecoder::new(Cursor::new(input))
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].language, "ja");
        assert!(records[0].official);
        assert!(records[0].synonyms.is_empty());
        assert_eq!(records[1].kind, TitleKind::Synonym);
        assert!(!records[1].official);
        assert_eq!(records[1].synonyms, vec!["CB", "Bebop"]);
        assert_eq!(records[1].tags, vec!["space", "noir"]);
    }

    #[test]
    fn short_line_reports_line_number() {
        let input = "a1\ten\tofficial\tt\tFine\nbroken\tline\n";
        let mut decoder = TsvRecordDecoder::new(Cursor::new(input));
        assert!(decoder.next().unwrap().is_ok());
        match decoder.next().unwrap() {
            Err(SourceError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed line, got {other:?}"),
        }
    }

    #[test]
    fn bad_official_flag_is_rejected() {
        let input = "a1\ten\tofficial\tyes\tTitle\n";
        let err = TsvRecordDecoder::new(Cursor::new(input))
            .next()
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("official flag"));
    }

    #[test]
    fn relation_and_source_columns_are_optional() {
        let input = "a1\ten\tofficial\tt\tAkira\t\tcyberpunk\thttps://anidb.net/anime/9\thttps://anidb.net/anime/28|https://kitsu.app/anime/akira\n";
        let rec = TsvRecordDecoder::new(Cursor::new(input))
            .next()
            .unwrap()
            .unwrap();
        assert!(rec.synonyms.is_empty());
        assert_eq!(rec.tags, vec!["cyberpunk"]);
        assert_eq!(rec.relations, vec!["https://anidb.net/anime/9"]);
        assert_eq!(rec.sources.len(), 2);
    }

    #[test]
    fn title_keeps_inner_spaces() {
        let input = "v5\tx-jat\tprimary\tt\tShin Seiki  Evangelion\n";
        let rec = TsvRecordDecoder::new(Cursor::new(input))
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(rec.title, "Shin Seiki  Evangelion");
    }
}
