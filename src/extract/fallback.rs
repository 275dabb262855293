//! Keyword-based field extraction, the deterministic fallback.
//!
//! Dictionaries are ordered: the first matching entry wins, so more specific
//! terms ("Crohn's disease") must precede broader ones ("cancer"). All
//! matching is case-insensitive over the raw paper text.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{CurationField, FieldResult};

/// Fixed confidence for keyword hits. A dictionary match is real evidence but
/// carries no context, so it sits above the default gate threshold and below
/// a confident model answer.
pub const HEURISTIC_CONFIDENCE: f64 = 0.6;

const ABSENT_REASON: &str = "No matching keywords found in the paper text";

/// (canonical label, keywords that map to it)
type Dictionary = &'static [(&'static str, &'static [&'static str])];

const HOST_SPECIES: Dictionary = &[
    ("Human", &["human", "homo sapiens", "patient", "participant", "volunteer"]),
    ("Mouse", &["mouse", "mice", "murine", "mus musculus"]),
    ("Rat", &["rat", "rattus"]),
    ("Zebrafish", &["zebrafish", "danio rerio"]),
    ("Fruit fly", &["drosophila", "fruit fly"]),
];

const BODY_SITE: Dictionary = &[
    ("Gut", &["gut", "intestinal", "intestine", "fecal", "faecal", "stool", "feces", "colon", "cecal", "caecal"]),
    ("Oral", &["oral", "saliva", "salivary", "dental", "tongue", "gingival"]),
    ("Skin", &["skin", "cutaneous", "dermal"]),
    ("Vaginal", &["vaginal", "vagina", "cervicovaginal"]),
    ("Lung", &["lung", "pulmonary", "respiratory", "sputum", "bronchoalveolar"]),
    ("Nasal", &["nasal", "nasopharyngeal", "sinus"]),
];

const CONDITION: Dictionary = &[
    ("Inflammatory bowel disease", &["inflammatory bowel disease", "ibd"]),
    ("Crohn's disease", &["crohn"]),
    ("Ulcerative colitis", &["ulcerative colitis"]),
    ("Irritable bowel syndrome", &["irritable bowel syndrome", "ibs"]),
    ("Obesity", &["obesity", "obese"]),
    ("Type 2 diabetes", &["type 2 diabetes", "t2d"]),
    ("Diabetes", &["diabetes", "diabetic"]),
    ("Colorectal cancer", &["colorectal cancer", "crc"]),
    ("Cancer", &["cancer", "carcinoma", "tumor", "tumour"]),
    ("Antibiotic treatment", &["antibiotic", "antimicrobial treatment"]),
    ("Probiotic intervention", &["probiotic"]),
];

const SEQUENCING_TYPE: Dictionary = &[
    ("16S rRNA amplicon sequencing", &["16s rrna", "16s ribosomal", "amplicon sequencing", "16s sequencing"]),
    ("Shotgun metagenomics", &["shotgun metagenomic", "whole genome shotgun", "metagenomic sequencing", "metagenomics"]),
    ("Metatranscriptomics", &["metatranscriptomic", "rna-seq of the microbiome"]),
    ("qPCR", &["qpcr", "quantitative pcr", "real-time pcr"]),
];

const TAXA_LEVEL: Dictionary = &[
    ("Phylum", &["phylum", "phyla"]),
    ("Family", &["family-level", "family level", "families"]),
    ("Genus", &["genus", "genera", "genus-level"]),
    ("Species", &["species-level", "species level", "at the species"]),
];

fn dictionary_for(field: CurationField) -> Option<Dictionary> {
    match field {
        CurationField::HostSpecies => Some(HOST_SPECIES),
        CurationField::BodySite => Some(BODY_SITE),
        CurationField::Condition => Some(CONDITION),
        CurationField::SequencingType => Some(SEQUENCING_TYPE),
        CurationField::TaxaLevel => Some(TAXA_LEVEL),
        CurationField::SampleSize => None,
    }
}

fn sample_size_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // n = 120
            r"(?i)\bn\s*=\s*(\d{1,5})\b",
            // 120 participants / patients / subjects / samples / individuals
            r"(?i)\b(\d{1,5})\s+(?:participants|patients|subjects|samples|individuals|volunteers|donors)\b",
            // a total of 120 / cohort of 120 / enrolled 120
            r"(?i)\b(?:total\s+of|cohort\s+of|enrolled|recruited)\s+(\d{1,5})\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("sample-size patterns are static and valid"))
        .collect()
    })
}

/// Deterministic keyword extractor. Always answers; never errors.
#[derive(Debug, Default, Clone)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract one field from paper text. The result is authoritative once
    /// the probabilistic path has failed, including an ABSENT verdict.
    pub fn extract(&self, field: CurationField, text: &str) -> FieldResult {
        if text.trim().is_empty() {
            return FieldResult::absent(ABSENT_REASON);
        }

        if field == CurationField::SampleSize {
            return self.extract_sample_size(text);
        }

        let lowered = text.to_lowercase();
        let Some(dictionary) = dictionary_for(field) else {
            return FieldResult::absent(ABSENT_REASON);
        };

        for (label, keywords) in dictionary {
            if let Some(hit) = keywords.iter().find(|kw| lowered.contains(*kw)) {
                tracing::debug!(%field, label, keyword = hit, "keyword fallback matched");
                return FieldResult::present(*label, HEURISTIC_CONFIDENCE);
            }
        }

        FieldResult::absent(ABSENT_REASON)
    }

    fn extract_sample_size(&self, text: &str) -> FieldResult {
        for pattern in sample_size_patterns() {
            if let Some(caps) = pattern.captures(text) {
                if let Some(count) = caps.get(1) {
                    return FieldResult::present(count.as_str(), HEURISTIC_CONFIDENCE);
                }
            }
        }
        FieldResult::absent(ABSENT_REASON)
    }
}
