//! Two-tier per-field analysis of a retrieved paper.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::extract::{gate, ExtractionOutcome, FieldModel, KeywordExtractor, ModelError};
use crate::models::{curation_summary, AnalysisResult, CurationField, FieldResult, PaperRecord};

/// Extracts all six curation fields from a paper.
///
/// Each field is tried against the probabilistic model first; any failure of
/// that path (model error, per-field timeout, or a confidence-gate rejection)
/// hands the field to the keyword fallback, whose verdict is authoritative
/// even when it is ABSENT. Fields are evaluated independently: one field's
/// trouble never contaminates another's result.
pub struct PaperAnalyzer {
    model: Arc<dyn FieldModel>,
    fallback: KeywordExtractor,
    threshold: f64,
    field_timeout: Duration,
}

impl PaperAnalyzer {
    pub fn new(model: Arc<dyn FieldModel>, threshold: f64, field_timeout: Duration) -> Self {
        Self {
            model,
            fallback: KeywordExtractor::new(),
            threshold,
            field_timeout,
        }
    }

    /// Analyze one paper. Pure over its inputs: the same record and the same
    /// model replies yield the same field results.
    pub async fn analyze(&self, record: &PaperRecord) -> AnalysisResult {
        let started = Instant::now();
        let text = record.analysis_text();

        let mut fields = BTreeMap::new();
        for field in CurationField::ALL {
            let result = if text.trim().is_empty() {
                FieldResult::absent("Paper has no analyzable text")
            } else {
                self.extract_one(field, text).await
            };
            fields.insert(field, result);
        }

        let mut analysis = AnalysisResult {
            record: record.clone(),
            curation_summary: String::new(),
            fields,
            processing_ms: started.elapsed().as_millis() as u64,
            analyzed_at: Utc::now(),
        };
        let missing = analysis.missing_fields();
        analysis.curation_summary = curation_summary(&missing);

        tracing::info!(
            pmid = %record.pmid,
            missing = missing.len(),
            elapsed_ms = analysis.processing_ms,
            "analyzed paper"
        );
        analysis
    }

    async fn extract_one(&self, field: CurationField, text: &str) -> FieldResult {
        let model_reply = tokio::time::timeout(
            self.field_timeout,
            self.model.extract_field(field, text),
        )
        .await
        .map_err(|_| ModelError::Timeout)
        .and_then(|r| r);

        match model_reply {
            Ok(extraction) => match gate(extraction, self.threshold) {
                ExtractionOutcome::Accepted(result) => {
                    tracing::debug!(%field, model = self.model.name(), "model extraction accepted");
                    result
                }
                ExtractionOutcome::Rejected { reason } => {
                    tracing::debug!(%field, %reason, "model extraction rejected, using fallback");
                    self.fallback.extract(field, text)
                }
            },
            Err(err) => {
                tracing::debug!(%field, error = %err, "model failed, using fallback");
                self.fallback.extract(field, text)
            }
        }
    }
}
