//! Core data structures for the retrieval-and-extraction pipeline.

mod analysis;
mod paper;

pub use analysis::{
    curation_summary, AnalysisResult, BatchError, BatchItem, BatchOutcome, CurationField,
    FieldResult, FieldStatus,
};
pub use paper::{InvalidPmid, PaperRecord, Pmid};
