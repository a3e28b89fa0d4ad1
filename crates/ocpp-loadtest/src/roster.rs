//! # Roster Loading
//!
//! The list of charge points to simulate: a header-less CSV with one
//! `cpId,idTag` pair per line.

use crate::error::{LoadTestError, LoadTestResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Id tag used for rows that do not carry one
pub const DEFAULT_ID_TAG: &str = "TEST-TAG";

/// One charge point to simulate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub cp_id: String,
    pub id_tag: String,
}

impl RosterEntry {
    pub fn new(cp_id: impl Into<String>, id_tag: impl Into<String>) -> Self {
        Self {
            cp_id: cp_id.into(),
            id_tag: id_tag.into(),
        }
    }
}

/// Row selection applied while loading
#[derive(Debug, Clone, Default)]
pub struct RosterFilter {
    /// Keep only charge point ids matching this regex; an invalid pattern
    /// is ignored
    pub grep: Option<String>,
    /// Rows to skip after filtering
    pub offset: usize,
    /// Id tag for rows without one, `TEST-TAG` when unset
    pub default_id_tag: Option<String>,
}

/// Load the roster at `path`
pub fn load_roster(path: impl AsRef<Path>, filter: &RosterFilter) -> LoadTestResult<Vec<RosterEntry>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| LoadTestError::roster(path, e.to_string()))?;
    let entries =
        parse_roster(file, filter).map_err(|e| LoadTestError::roster(path, e.to_string()))?;
    debug!("Loaded {} roster rows from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse roster rows from any reader
pub fn parse_roster<R: Read>(reader: R, filter: &RosterFilter) -> LoadTestResult<Vec<RosterEntry>> {
    let pattern = filter.grep.as_deref().and_then(|grep| match Regex::new(grep) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring invalid roster filter '{}': {}", grep, e);
            None
        }
    });
    let default_id_tag = filter.default_id_tag.as_deref().unwrap_or(DEFAULT_ID_TAG);

    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for record in csv.records() {
        let record = record.map_err(|e| LoadTestError::serialization(e.to_string()))?;
        let cp_id = record.get(0).unwrap_or_default();
        if cp_id.is_empty() {
            continue;
        }
        if let Some(re) = &pattern {
            if !re.is_match(cp_id) {
                continue;
            }
        }
        let id_tag = record
            .get(1)
            .filter(|tag| !tag.is_empty())
            .unwrap_or(default_id_tag);
        entries.push(RosterEntry::new(cp_id, id_tag));
    }

    Ok(entries.into_iter().skip(filter.offset).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str, filter: &RosterFilter) -> Vec<RosterEntry> {
        parse_roster(text.as_bytes(), filter).unwrap()
    }

    #[test]
    fn test_rows_are_trimmed_and_defaulted() {
        let rows = parse(
            "CP001,TAG1\n\n  CP002 , TAG2 \nCP003\n,ORPHAN\nCP004,\n",
            &RosterFilter::default(),
        );
        assert_eq!(
            rows,
            vec![
                RosterEntry::new("CP001", "TAG1"),
                RosterEntry::new("CP002", "TAG2"),
                RosterEntry::new("CP003", DEFAULT_ID_TAG),
                RosterEntry::new("CP004", DEFAULT_ID_TAG),
            ]
        );
    }

    #[test]
    fn test_grep_then_offset() {
        let filter = RosterFilter {
            grep: Some("^PARIS-".to_string()),
            offset: 1,
            default_id_tag: None,
        };
        let rows = parse("PARIS-1,A\nLYON-1,B\nPARIS-2,C\nPARIS-3,D\n", &filter);
        assert_eq!(
            rows,
            vec![RosterEntry::new("PARIS-2", "C"), RosterEntry::new("PARIS-3", "D")]
        );
    }

    #[test]
    fn test_invalid_grep_is_ignored() {
        let filter = RosterFilter {
            grep: Some("([".to_string()),
            ..Default::default()
        };
        assert_eq!(parse("CP1,A\nCP2,B\n", &filter).len(), 2);
    }

    #[test]
    fn test_custom_default_tag() {
        let filter = RosterFilter {
            default_id_tag: Some("FLEET".to_string()),
            ..Default::default()
        };
        assert_eq!(parse("CP1\n", &filter)[0].id_tag, "FLEET");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CP100,TAG100").unwrap();
        writeln!(file, "CP101,TAG101").unwrap();

        let rows = load_roster(file.path(), &RosterFilter::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cp_id, "CP101");

        let missing = load_roster("/definitely/not/here.csv", &RosterFilter::default());
        assert!(matches!(missing, Err(LoadTestError::RosterError { .. })));
    }
}
