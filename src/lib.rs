//! PubMed/PMC retrieval and BugSigDB field extraction pipeline.
//!
//! The pipeline fetches paper metadata and open-access full text from the
//! NCBI E-utilities, then extracts the six essential BugSigDB curation
//! fields using a probabilistic model with a deterministic keyword fallback.

pub mod batch;
pub mod config;
pub mod extract;
pub mod models;
pub mod retrieval;
pub mod ui;
pub mod utils;

pub use batch::{BatchProcessor, Pipeline};
pub use config::Config;
pub use extract::{FieldModel, GeminiModel, KeywordExtractor, MockFieldModel, PaperAnalyzer};
pub use models::{
    AnalysisResult, BatchOutcome, CurationField, FieldResult, FieldStatus, PaperRecord, Pmid,
};
pub use retrieval::{EutilsClient, RetrievalError};
pub use utils::MemoryCache;

/// Crate version, surfaced in the CLI and the HTTP user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
