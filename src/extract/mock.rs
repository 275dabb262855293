//! Deterministic in-process model for tests and offline runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::extract::{FieldExtraction, FieldModel, ModelError};
use crate::models::CurationField;

/// A scripted [`FieldModel`]: replies are registered per field up front, and
/// any field without a script errors as unavailable. Counts calls so tests
/// can assert how often the probabilistic path was consulted.
#[derive(Default)]
pub struct MockFieldModel {
    replies: Mutex<HashMap<CurationField, Result<FieldExtraction, ModelError>>>,
    calls: AtomicUsize,
}

impl MockFieldModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, field: CurationField, extraction: FieldExtraction) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(field, Ok(extraction));
        }
        self
    }

    pub fn with_error(self, field: CurationField, error: ModelError) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.insert(field, Err(error));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldModel for MockFieldModel {
    async fn extract_field(
        &self,
        field: CurationField,
        _text: &str,
    ) -> Result<FieldExtraction, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let replies = self
            .replies
            .lock()
            .map_err(|_| ModelError::Unavailable("mock poisoned".into()))?;
        match replies.get(&field) {
            Some(reply) => reply.clone(),
            None => Err(ModelError::Unavailable("no scripted reply".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
