//! Paper identifier and retrieved paper record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum digits accepted in a PubMed identifier.
const MAX_PMID_LEN: usize = 9;

/// A validated PubMed identifier.
///
/// PMIDs are opaque to the rest of the pipeline: once accepted they are only
/// ever compared, hashed, and echoed back. Validation is format-only (ASCII
/// digits, bounded length); whether the paper exists is the upstream
/// service's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pmid(String);

impl Pmid {
    /// Parse and validate an identifier string.
    pub fn new(raw: &str) -> Result<Self, InvalidPmid> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_PMID_LEN {
            return Err(InvalidPmid(raw.to_string()));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidPmid(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pmid {
    type Err = InvalidPmid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Rejected identifier (not numeric, empty, or too long).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid PMID: {0:?} (expected 1-9 ASCII digits)")]
pub struct InvalidPmid(pub String);

/// A retrieved representation of one paper.
///
/// Created by the retrieval client on a successful fetch and never mutated
/// afterwards; a fresh fetch after cache expiry produces a new record rather
/// than editing the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    /// PubMed identifier
    pub pmid: Pmid,

    /// Paper title
    pub title: String,

    /// Authors in citation order
    pub authors: Vec<String>,

    /// Journal name
    pub journal: String,

    /// Publication year/date as reported by PubMed
    pub publication_date: String,

    /// Abstract text
    pub r#abstract: String,

    /// Full text from PMC, empty when the paper has no open-access deposit
    pub full_text: String,

    /// True iff `full_text` is non-empty
    pub has_full_text: bool,

    /// When this record was fetched
    pub retrieved_at: DateTime<Utc>,
}

impl PaperRecord {
    /// Text the extraction layer should analyze: full text when available,
    /// otherwise the abstract.
    pub fn analysis_text(&self) -> &str {
        if self.has_full_text {
            &self.full_text
        } else {
            &self.r#abstract
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pmid_accepts_digits() {
        let pmid = Pmid::new("34845010").unwrap();
        assert_eq!(pmid.as_str(), "34845010");
        assert_eq!(pmid.to_string(), "34845010");
    }

    #[test]
    fn test_pmid_trims_whitespace() {
        assert_eq!(Pmid::new(" 12345 ").unwrap().as_str(), "12345");
    }

    #[test]
    fn test_pmid_rejects_garbage() {
        assert!(Pmid::new("").is_err());
        assert!(Pmid::new("PMC123").is_err());
        assert!(Pmid::new("12 34").is_err());
        assert!(Pmid::new("-123").is_err());
        assert!(Pmid::new("1234567890").is_err()); // too long
    }

    #[test]
    fn test_analysis_text_prefers_full_text() {
        let mut record = PaperRecord {
            pmid: Pmid::new("1").unwrap(),
            title: "t".into(),
            authors: vec![],
            journal: String::new(),
            publication_date: String::new(),
            r#abstract: "the abstract".into(),
            full_text: "the body".into(),
            has_full_text: true,
            retrieved_at: Utc::now(),
        };
        assert_eq!(record.analysis_text(), "the body");

        record.full_text.clear();
        record.has_full_text = false;
        assert_eq!(record.analysis_text(), "the abstract");
    }
}
