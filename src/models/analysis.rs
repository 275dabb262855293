//! Analysis results: the six BugSigDB curation fields and batch outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::PaperRecord;

/// The six essential BugSigDB curation fields, in canonical order.
///
/// The derived `Ord` follows declaration order, so a `BTreeMap` keyed by
/// `CurationField` always iterates (and serializes) in canonical order no
/// matter what order the fields were evaluated in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CurationField {
    HostSpecies,
    BodySite,
    Condition,
    SequencingType,
    TaxaLevel,
    SampleSize,
}

impl CurationField {
    /// All six fields in canonical order.
    pub const ALL: [CurationField; 6] = [
        CurationField::HostSpecies,
        CurationField::BodySite,
        CurationField::Condition,
        CurationField::SequencingType,
        CurationField::TaxaLevel,
        CurationField::SampleSize,
    ];

    /// Stable snake_case key used in serialized output.
    pub fn key(&self) -> &'static str {
        match self {
            CurationField::HostSpecies => "host_species",
            CurationField::BodySite => "body_site",
            CurationField::Condition => "condition",
            CurationField::SequencingType => "sequencing_type",
            CurationField::TaxaLevel => "taxa_level",
            CurationField::SampleSize => "sample_size",
        }
    }

    /// The question posed to the probabilistic model for this field.
    pub fn question(&self) -> &'static str {
        match self {
            CurationField::HostSpecies => {
                "What host species is being studied in this research?"
            }
            CurationField::BodySite => {
                "What body site or anatomical location was sampled for microbiome analysis?"
            }
            CurationField::Condition => {
                "What disease, treatment, or condition is being studied?"
            }
            CurationField::SequencingType => {
                "What sequencing method or molecular technique was used?"
            }
            CurationField::TaxaLevel => {
                "What taxonomic level was analyzed (phylum, genus, species, etc.)?"
            }
            CurationField::SampleSize => {
                "How many samples or participants were included in the study?"
            }
        }
    }
}

impl fmt::Display for CurationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Whether the information for a field was found in the paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    Present,
    PartiallyPresent,
    Absent,
}

/// Extraction result for a single curation field.
///
/// An ABSENT result never carries a value; its confidence is 0 and the reason
/// explains what went missing. Confidence is only meaningful for PRESENT and
/// PARTIALLY_PRESENT results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub status: FieldStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FieldResult {
    pub fn present(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            status: FieldStatus::Present,
            value: Some(value.into()),
            confidence: confidence.clamp(0.0, 1.0),
            reason: None,
        }
    }

    pub fn partially_present(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            status: FieldStatus::PartiallyPresent,
            value: Some(value.into()),
            confidence: confidence.clamp(0.0, 1.0),
            reason: None,
        }
    }

    pub fn absent(reason: impl Into<String>) -> Self {
        Self {
            status: FieldStatus::Absent,
            value: None,
            confidence: 0.0,
            reason: Some(reason.into()),
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == FieldStatus::Present
    }
}

/// Complete analysis of one paper: the record plus the six field results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The paper the fields were extracted from
    pub record: PaperRecord,

    /// All six fields, keyed in canonical order
    pub fields: BTreeMap<CurationField, FieldResult>,

    /// Human-readable readiness summary derived from the six statuses
    pub curation_summary: String,

    /// Wall-clock time the analysis took
    pub processing_ms: u64,

    /// When the analysis ran
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Fields whose status is not PRESENT, in canonical order.
    pub fn missing_fields(&self) -> Vec<CurationField> {
        self.fields
            .iter()
            .filter(|(_, r)| !r.is_present())
            .map(|(f, _)| *f)
            .collect()
    }
}

/// Build the curation readiness summary from the set of non-PRESENT fields.
pub fn curation_summary(missing: &[CurationField]) -> String {
    match missing.len() {
        0 => "All required fields are present. Paper is ready for curation.".to_string(),
        1 => format!(
            "Missing 1 field: {}. Review paper for this information.",
            missing[0]
        ),
        n @ 2..=3 => format!(
            "Missing {} fields: {}. Paper needs additional review.",
            n,
            join_fields(missing)
        ),
        n => format!(
            "Missing {} fields: {}. Paper requires significant review before curation.",
            n,
            join_fields(missing)
        ),
    }
}

fn join_fields(fields: &[CurationField]) -> String {
    fields
        .iter()
        .map(|f| f.key())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-identifier failure descriptor inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BatchError {
    /// The identifier failed format validation
    #[error("invalid identifier: {0}")]
    InvalidPmid(String),

    /// Retrieval failed (after the client's own retries)
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The unit was cancelled (batch timeout or caller cancellation)
    #[error("cancelled before completion")]
    Cancelled,
}

/// One slot of a batch outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub pmid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchError>,
}

impl BatchItem {
    pub fn succeeded(pmid: String, analysis: AnalysisResult) -> Self {
        Self {
            pmid,
            analysis: Some(analysis),
            error: None,
        }
    }

    pub fn failed(pmid: String, error: BatchError) -> Self {
        Self {
            pmid,
            analysis: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.analysis.is_some()
    }
}

/// Ordered result of a batch run: one slot per input identifier, in input
/// order, regardless of completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    /// The error manifest: (input position, pmid, error) for every failed slot.
    pub fn errors(&self) -> Vec<(usize, &str, &BatchError)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.error.as_ref().map(|e| (i, item.pmid.as_str(), e)))
            .collect()
    }
}

impl From<crate::models::paper::InvalidPmid> for BatchError {
    fn from(err: crate::models::paper::InvalidPmid) -> Self {
        BatchError::InvalidPmid(err.0)
    }
}
