//! In-process caching of paper records and analysis results.
//!
//! Entries are keyed by PMID, namespaced by kind so a cached record and a
//! cached analysis for the same paper never collide. Each entry carries its
//! own TTL; expired entries are never returned and are evicted lazily on
//! access (or proactively via [`MemoryCache::sweep`]). A poisoned lock is
//! treated as a forced miss; the pipeline then simply fetches live.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::models::{AnalysisResult, PaperRecord, Pmid};

/// Result of a cache lookup.
pub enum CacheResult<T> {
    /// Entry found and still valid
    Hit(T),
    /// No entry for this key
    Miss,
    /// Entry found but past its TTL (evicted on the way out)
    Expired,
}

impl<T> CacheResult<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit(_))
    }
}

/// Namespace for cached values of different kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKind {
    Record,
    Analysis,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: CacheKind,
    pmid: String,
}

enum CachedValue {
    Record(PaperRecord),
    Analysis(AnalysisResult),
}

struct StoredEntry {
    value: CachedValue,
    stored_at: Instant,
    ttl: Duration,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// Thread-safe in-memory cache with per-kind TTLs.
pub struct MemoryCache {
    enabled: bool,
    record_ttl: Duration,
    analysis_ttl: Duration,
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
}

impl MemoryCache {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            record_ttl: config.record_ttl(),
            analysis_ttl: config.analysis_ttl(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A cache that never hits; used with `--no-cache`.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            record_ttl: Duration::ZERO,
            analysis_ttl: Duration::ZERO,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get_record(&self, pmid: &Pmid) -> CacheResult<PaperRecord> {
        match self.get(CacheKind::Record, pmid) {
            CacheResult::Hit(CachedValue::Record(record)) => CacheResult::Hit(record),
            CacheResult::Hit(_) => CacheResult::Miss,
            CacheResult::Miss => CacheResult::Miss,
            CacheResult::Expired => CacheResult::Expired,
        }
    }

    pub fn put_record(&self, record: &PaperRecord) {
        self.put(
            CacheKind::Record,
            &record.pmid,
            CachedValue::Record(record.clone()),
            self.record_ttl,
        );
    }

    pub fn get_analysis(&self, pmid: &Pmid) -> CacheResult<AnalysisResult> {
        match self.get(CacheKind::Analysis, pmid) {
            CacheResult::Hit(CachedValue::Analysis(analysis)) => CacheResult::Hit(analysis),
            CacheResult::Hit(_) => CacheResult::Miss,
            CacheResult::Miss => CacheResult::Miss,
            CacheResult::Expired => CacheResult::Expired,
        }
    }

    pub fn put_analysis(&self, analysis: &AnalysisResult) {
        self.put(
            CacheKind::Analysis,
            &analysis.record.pmid,
            CachedValue::Analysis(analysis.clone()),
            self.analysis_ttl,
        );
    }

    fn get(&self, kind: CacheKind, pmid: &Pmid) -> CacheResult<CachedValue> {
        if !self.enabled {
            return CacheResult::Miss;
        }

        let key = CacheKey {
            kind,
            pmid: pmid.as_str().to_string(),
        };

        let expired = {
            let Ok(entries) = self.entries.read() else {
                return CacheResult::Miss;
            };
            match entries.get(&key) {
                None => {
                    tracing::debug!(%pmid, ?kind, "cache MISS");
                    return CacheResult::Miss;
                }
                Some(entry) if entry.is_expired() => true,
                Some(entry) => {
                    tracing::debug!(%pmid, ?kind, "cache HIT");
                    return CacheResult::Hit(clone_value(&entry.value));
                }
            }
        };

        if expired {
            // Lazy eviction; re-check under the write lock since a fresh put
            // may have raced in.
            if let Ok(mut entries) = self.entries.write() {
                if entries.get(&key).is_some_and(|e| e.is_expired()) {
                    entries.remove(&key);
                }
            }
            tracing::debug!(%pmid, ?kind, "cache entry expired");
        }
        CacheResult::Expired
    }

    fn put(&self, kind: CacheKind, pmid: &Pmid, value: CachedValue, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let key = CacheKey {
            kind,
            pmid: pmid.as_str().to_string(),
        };

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                StoredEntry {
                    value,
                    stored_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (records, analyses) = self
            .entries
            .read()
            .map(|entries| {
                let records = entries
                    .keys()
                    .filter(|k| k.kind == CacheKind::Record)
                    .count();
                (records, entries.len() - records)
            })
            .unwrap_or((0, 0));

        CacheStats {
            enabled: self.enabled,
            record_entries: records,
            analysis_entries: analyses,
            record_ttl: self.record_ttl,
            analysis_ttl: self.analysis_ttl,
        }
    }
}

fn clone_value(value: &CachedValue) -> CachedValue {
    match value {
        CachedValue::Record(r) => CachedValue::Record(r.clone()),
        CachedValue::Analysis(a) => CachedValue::Analysis(a.clone()),
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub enabled: bool,
    pub record_entries: usize,
    pub analysis_entries: usize,
    pub record_ttl: Duration,
    pub analysis_ttl: Duration,
}
