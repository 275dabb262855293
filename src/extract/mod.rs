//! Field extraction: a probabilistic model first, keyword fallback second.

mod analyzer;
mod fallback;
mod gemini;
mod mock;

pub use analyzer::PaperAnalyzer;
pub use fallback::KeywordExtractor;
pub use gemini::GeminiModel;
pub use mock::MockFieldModel;

use async_trait::async_trait;

use crate::models::{CurationField, FieldResult, FieldStatus};

/// Errors from a probabilistic field model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// The model is not configured (e.g. no API key)
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The model API call failed
    #[error("model API error: {0}")]
    Api(String),

    /// The model replied with something unusable
    #[error("unparseable model reply: {0}")]
    Parse(String),

    /// The per-field deadline elapsed
    #[error("model timed out")]
    Timeout,
}

/// What a model claims about one field, before confidence gating.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExtraction {
    pub status: FieldStatus,
    pub value: Option<String>,
    pub confidence: f64,
    pub reason: Option<String>,
}

/// A source of per-field extractions from paper text.
#[async_trait]
pub trait FieldModel: Send + Sync {
    /// Extract one curation field from the paper text.
    async fn extract_field(
        &self,
        field: CurationField,
        text: &str,
    ) -> Result<FieldExtraction, ModelError>;

    /// Short model name for logs and output.
    fn name(&self) -> &str;
}

/// Outcome of confidence-gating a model extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The extraction cleared the gate and becomes the field result
    Accepted(FieldResult),
    /// The extraction was discarded; the fallback decides the field
    Rejected { reason: String },
}

/// Apply the confidence gate to a model extraction.
///
/// An extraction is accepted when it carries a value, claims PRESENT or
/// PARTIALLY_PRESENT, and its confidence meets the threshold. Confidence
/// exactly at the threshold passes. Everything else falls through to the
/// keyword fallback; the rejected value is discarded, never blended in.
pub fn gate(extraction: FieldExtraction, threshold: f64) -> ExtractionOutcome {
    if extraction.status == FieldStatus::Absent || extraction.value.is_none() {
        return ExtractionOutcome::Rejected {
            reason: "model reported the field as absent".to_string(),
        };
    }
    if extraction.confidence < threshold {
        return ExtractionOutcome::Rejected {
            reason: format!(
                "model confidence {:.2} below threshold {:.2}",
                extraction.confidence, threshold
            ),
        };
    }

    let value = extraction.value.unwrap_or_default();
    let result = match extraction.status {
        FieldStatus::Present => FieldResult::present(value, extraction.confidence),
        FieldStatus::PartiallyPresent => {
            FieldResult::partially_present(value, extraction.confidence)
        }
        FieldStatus::Absent => unreachable!("absent handled above"),
    };
    ExtractionOutcome::Accepted(result)
}
