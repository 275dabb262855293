//! Gemini-backed field model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::extract::{FieldExtraction, FieldModel, ModelError};
use crate::models::{CurationField, FieldStatus};
use crate::utils::HttpClient;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Characters of paper text included in a prompt. Counted in chars, truncated
/// at a char boundary so multi-byte text never splits.
const MAX_CONTEXT_CHARS: usize = 2000;

/// Field extraction via the Gemini generateContent API.
///
/// Without an API key the model is permanently unavailable and every call
/// falls straight through to the keyword fallback.
pub struct GeminiModel {
    http: HttpClient,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiModel {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(Duration::from_secs(30)),
            api_key,
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Point the model at a different base URL (for testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_prompt(field: CurationField, text: &str) -> String {
        let context: String = text.chars().take(MAX_CONTEXT_CHARS).collect();
        format!(
            "You are extracting structured curation data from a microbiome research paper.\n\
             Question: {}\n\n\
             Paper text:\n{}\n\n\
             Answer with a single JSON object and nothing else:\n\
             {{\"status\": \"PRESENT\" | \"PARTIALLY_PRESENT\" | \"ABSENT\", \
             \"value\": string or null, \
             \"confidence\": number between 0 and 1, \
             \"reason_if_missing\": string or null}}",
            field.question(),
            context
        )
    }
}

#[async_trait]
impl FieldModel for GeminiModel {
    async fn extract_field(
        &self,
        field: CurationField,
        text: &str,
    ) -> Result<FieldExtraction, ModelError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ModelError::Unavailable("no API key configured".into()));
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url,
            self.model,
            urlencoding::encode(api_key)
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Self::build_prompt(field, text),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 256,
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ModelError::Api(format!("status {}", status.as_u16())));
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let reply = envelope
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ModelError::Parse("empty reply".into()))?;

        parse_reply(&reply)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ReplyContent>,
}

#[derive(Debug, Deserialize)]
struct ReplyContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    status: Option<String>,
    value: Option<String>,
    confidence: Option<f64>,
    reason_if_missing: Option<String>,
}

/// Parse the JSON object out of a model reply. Replies often arrive wrapped
/// in markdown fences or prose, so only the outermost brace pair is parsed.
fn parse_reply(reply: &str) -> Result<FieldExtraction, ModelError> {
    let start = reply
        .find('{')
        .ok_or_else(|| ModelError::Parse("no JSON object in reply".into()))?;
    let end = reply
        .rfind('}')
        .ok_or_else(|| ModelError::Parse("no JSON object in reply".into()))?;
    if end < start {
        return Err(ModelError::Parse("malformed JSON braces in reply".into()));
    }

    let payload: ReplyPayload = serde_json::from_str(&reply[start..=end])
        .map_err(|e| ModelError::Parse(e.to_string()))?;

    let status = match payload.status.as_deref() {
        Some("PRESENT") => FieldStatus::Present,
        Some("PARTIALLY_PRESENT") => FieldStatus::PartiallyPresent,
        Some("ABSENT") | None => FieldStatus::Absent,
        Some(other) => {
            return Err(ModelError::Parse(format!("unknown status {other:?}")));
        }
    };

    let value = payload
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "null");

    Ok(FieldExtraction {
        status,
        value,
        confidence: payload.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        reason: payload.reason_if_missing,
    })
}
