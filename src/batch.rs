//! Single-paper pipeline and concurrent batch orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::BatchConfig;
use crate::extract::PaperAnalyzer;
use crate::models::{AnalysisResult, BatchError, BatchItem, BatchOutcome, PaperRecord, Pmid};
use crate::retrieval::{EutilsClient, RetrievalError};
use crate::utils::{CacheResult, MemoryCache};

/// Retrieval plus extraction for a single paper, cache-aware at both stages.
pub struct Pipeline {
    client: EutilsClient,
    analyzer: PaperAnalyzer,
    cache: MemoryCache,
}

impl Pipeline {
    pub fn new(client: EutilsClient, analyzer: PaperAnalyzer, cache: MemoryCache) -> Self {
        Self {
            client,
            analyzer,
            cache,
        }
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    /// Fetch one paper, serving from cache when possible.
    pub async fn fetch_paper(&self, pmid: &Pmid) -> Result<PaperRecord, RetrievalError> {
        if let CacheResult::Hit(record) = self.cache.get_record(pmid) {
            return Ok(record);
        }

        let record = self.client.fetch_full_paper(pmid).await?;
        self.cache.put_record(&record);
        Ok(record)
    }

    /// Fetch and analyze one paper, serving a cached analysis when possible.
    pub async fn analyze_paper(&self, pmid: &Pmid) -> Result<AnalysisResult, RetrievalError> {
        if let CacheResult::Hit(analysis) = self.cache.get_analysis(pmid) {
            return Ok(analysis);
        }

        let record = self.fetch_paper(pmid).await?;
        let analysis = self.analyzer.analyze(&record).await;
        self.cache.put_analysis(&analysis);
        Ok(analysis)
    }
}

/// Concurrent batch runner over the single-paper pipeline.
///
/// Input identifiers are deduplicated before dispatch (each unique paper is
/// processed at most once per batch), but the outcome always has exactly one
/// slot per input, in input order. One paper's failure never affects the
/// others; an overall timeout cancels whatever has not finished and marks
/// those slots cancelled.
pub struct BatchProcessor {
    pipeline: Arc<Pipeline>,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(pipeline: Arc<Pipeline>, config: BatchConfig) -> Self {
        Self { pipeline, config }
    }

    pub async fn process(&self, inputs: &[String]) -> BatchOutcome {
        let started = Instant::now();

        // Validate up front; invalid identifiers never reach the network.
        let parsed: Vec<Result<Pmid, BatchError>> = inputs
            .iter()
            .map(|raw| Pmid::new(raw).map_err(BatchError::from))
            .collect();

        // Dedup valid identifiers, preserving first-seen order.
        let mut unique: Vec<Pmid> = Vec::new();
        for pmid in parsed.iter().flatten() {
            if !unique.contains(pmid) {
                unique.push(pmid.clone());
            }
        }

        tracing::info!(
            inputs = inputs.len(),
            unique = unique.len(),
            max_concurrent = self.config.max_concurrent,
            "starting batch"
        );

        let completed = self.run_unique(unique).await;

        let items = inputs
            .iter()
            .zip(parsed)
            .map(|(raw, parsed)| match parsed {
                Err(err) => BatchItem::failed(raw.clone(), err),
                Ok(pmid) => match completed.get(&pmid) {
                    Some(Ok(analysis)) => BatchItem::succeeded(raw.clone(), analysis.clone()),
                    Some(Err(err)) => BatchItem::failed(raw.clone(), err.clone()),
                    // Aborted before its task produced a result.
                    None => BatchItem::failed(raw.clone(), BatchError::Cancelled),
                },
            })
            .collect();

        let outcome = BatchOutcome {
            items,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            elapsed_ms = outcome.elapsed_ms,
            "batch finished"
        );
        outcome
    }

    /// Run every unique identifier under the concurrency limit, with the
    /// optional overall deadline.
    async fn run_unique(
        &self,
        unique: Vec<Pmid>,
    ) -> HashMap<Pmid, Result<AnalysisResult, BatchError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();

        for pmid in unique {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                // A closed semaphore only happens on abort, which discards
                // the task's output anyway.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (pmid, Err(BatchError::Cancelled)),
                };
                let result = pipeline
                    .analyze_paper(&pmid)
                    .await
                    .map_err(|e| BatchError::Retrieval(e.to_string()));
                (pmid, result)
            });
        }

        let mut completed = HashMap::new();
        let deadline = self.config.timeout();

        let drain = async {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((pmid, result)) = joined {
                    completed.insert(pmid, result);
                }
            }
        };

        match deadline {
            None => drain.await,
            Some(limit) => {
                tokio::select! {
                    _ = drain => {}
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(timeout_secs = limit.as_secs(), "batch deadline elapsed, cancelling remainder");
                    }
                }
            }
        }

        // After a timeout, stop everything still running; results that raced
        // in before the abort are kept.
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((pmid, result)) = joined {
                completed.insert(pmid, result);
            }
        }

        completed
    }
}
