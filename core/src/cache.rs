//! Three-region result cache.
//!
//! Regions share one [`CacheBackend`] and are kept apart by key prefix. Each
//! entry is stored as a bincode envelope holding its creation time, TTL and
//! a JSON payload. A read sees the entry only while
//! `now < created_at + ttl`; anything older is deleted on the spot and
//! counted as a miss.
//!
//! Backend errors never leave this module. A failed read is a miss and a
//! failed write is dropped, both logged at `warn`.

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::engine::{EngineStats, SearchHit};
use crate::index::Document;
use crate::ranker::RankerKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STATS_KEY: &str = "engine_stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Document,
    Query,
    Stats,
}

impl Region {
    pub fn prefix(&self) -> &'static str {
        match self {
            Region::Document => "doc:",
            Region::Query => "query:",
            Region::Stats => "stats:",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Document => "document",
            Region::Query => "query",
            Region::Stats => "stats",
        }
    }
}

/// Stored form of every entry. Times are wall-clock milliseconds so they
/// stay meaningful in a persistent backend; a clock step moves expiry by the
/// same amount.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    created_at_ms: u64,
    ttl_ms: u64,
    payload: Vec<u8>,
}

impl Envelope {
    fn is_live(&self, now_ms: u64) -> bool { now_ms < self.created_at_ms.saturating_add(self.ttl_ms) }
}

enum Rejected {
    Expired,
    Undecodable(String),
}

fn now_ms() -> u64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000).max(0) as u64
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
}

impl RegionMetrics {
    pub fn new(hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_ratio = if total > 0 { hits as f64 / total as f64 } else { 0.0 };
        Self { hits, misses, hit_ratio }
    }

    pub fn total(&self) -> u64 { self.hits + self.misses }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub enabled: bool,
    pub backend: String,
    pub document: RegionMetrics,
    pub query: RegionMetrics,
    pub stats: RegionMetrics,
    pub aggregate: RegionMetrics,
}

/// One independently expiring key space.
pub struct CacheRegion<V> {
    region: Region,
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    _value: PhantomData<fn() -> V>,
}

impl<V> CacheRegion<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(region: Region, backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self { region, backend, default_ttl, hits: AtomicU64::new(0), misses: AtomicU64::new(0), _value: PhantomData }
    }

    pub fn region(&self) -> Region { self.region }

    pub fn default_ttl(&self) -> Duration { self.default_ttl }

    fn full_key(&self, key: &str) -> String { format!("{}{}", self.region.prefix(), key) }

    fn miss(&self, key: &str) -> Option<V> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(region = self.region.as_str(), key, "cache miss");
        None
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let full = self.full_key(key);
        let raw = match self.backend.get(&full) {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.miss(key),
            Err(e) => {
                tracing::warn!(region = self.region.as_str(), key, error = %e, "cache read failed");
                return self.miss(key);
            }
        };

        let value = bincode::deserialize::<Envelope>(&raw)
            .map_err(|e| Rejected::Undecodable(e.to_string()))
            .and_then(|env| {
                if !env.is_live(now_ms()) {
                    return Err(Rejected::Expired);
                }
                serde_json::from_slice::<V>(&env.payload).map_err(|e| Rejected::Undecodable(e.to_string()))
            });
        match value {
            Ok(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(region = self.region.as_str(), key, "cache hit");
                Some(v)
            }
            Err(rejected) => {
                if let Rejected::Undecodable(reason) = rejected {
                    tracing::warn!(region = self.region.as_str(), key, error = %reason, "dropping undecodable cache entry");
                }
                if let Err(e) = self.backend.delete_if_eq(&full, &raw) {
                    tracing::warn!(region = self.region.as_str(), key, error = %e, "cache expiry delete failed");
                }
                self.miss(key)
            }
        }
    }

    pub fn put(&self, key: &str, value: &V) { self.put_with_ttl(key, value, self.default_ttl) }

    pub fn put_with_ttl(&self, key: &str, value: &V, ttl: Duration) {
        let encoded = serde_json::to_vec(value).map_err(|e| e.to_string()).and_then(|payload| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            let env = Envelope { created_at_ms: now_ms(), ttl_ms, payload };
            bincode::serialize(&env).map_err(|e| e.to_string())
        });
        let bytes = match encoded {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(region = self.region.as_str(), key, error = %e, "cache entry not encodable");
                return;
            }
        };
        if let Err(e) = self.backend.set(&self.full_key(key), bytes) {
            tracing::warn!(region = self.region.as_str(), key, error = %e, "cache write dropped");
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Err(e) = self.backend.delete(&self.full_key(key)) {
            tracing::warn!(region = self.region.as_str(), key, error = %e, "cache invalidate failed");
        }
    }

    /// Drop every entry in the region. Counters are kept.
    pub fn invalidate_all(&self) {
        match self.backend.delete_prefix(self.region.prefix()) {
            Ok(n) => tracing::debug!(region = self.region.as_str(), removed = n, "region invalidated"),
            Err(e) => tracing::warn!(region = self.region.as_str(), error = %e, "region invalidate failed"),
        }
    }

    /// Drop every entry and zero the counters.
    pub fn clear(&self) {
        self.invalidate_all();
        self.reset_metrics();
    }

    pub fn reset_metrics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> RegionMetrics {
        RegionMetrics::new(self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}

/// Cache key for a query: sorted distinct terms, result limit and ranker,
/// hashed so equivalent queries collide and keys stay short.
pub fn query_key(terms: &[String], top_n: usize, ranker: RankerKind) -> String {
    let distinct: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
    let joined = distinct.into_iter().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha1::new();
    hasher.update(format!("{ranker}\u{1f}{joined}\u{1f}{top_n}").as_bytes());
    hasher.finalize().iter().fold(String::with_capacity(40), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub struct CacheManager {
    backend: Arc<dyn CacheBackend>,
    enabled: AtomicBool,
    documents: CacheRegion<Document>,
    queries: CacheRegion<Vec<SearchHit>>,
    stats: CacheRegion<EngineStats>,
}

impl CacheManager {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig, enabled: bool) -> Self {
        Self {
            documents: CacheRegion::new(Region::Document, backend.clone(), config.document_ttl()),
            queries: CacheRegion::new(Region::Query, backend.clone(), config.query_ttl()),
            stats: CacheRegion::new(Region::Stats, backend.clone(), config.stats_ttl()),
            enabled: AtomicBool::new(enabled),
            backend,
        }
    }

    pub fn is_enabled(&self) -> bool { self.enabled.load(Ordering::Acquire) }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            tracing::info!(enabled, "caching toggled");
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> { &self.backend }

    /// Region handles for reads and writes; `None` while caching is off.
    pub fn documents(&self) -> Option<&CacheRegion<Document>> { self.is_enabled().then_some(&self.documents) }

    pub fn queries(&self) -> Option<&CacheRegion<Vec<SearchHit>>> { self.is_enabled().then_some(&self.queries) }

    pub fn stats(&self) -> Option<&CacheRegion<EngineStats>> { self.is_enabled().then_some(&self.stats) }

    /// Drop everything a change to these documents could make stale: their
    /// document entries, every cached ranking and the stats snapshot. Runs
    /// even while caching is disabled so re-enabling never serves old data.
    pub fn invalidate_documents<'a, I>(&self, doc_ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in doc_ids {
            self.documents.invalidate(id);
        }
        self.queries.invalidate_all();
        self.stats.invalidate(STATS_KEY);
    }

    /// Rankings depend on the ranker, so a swap drops all of them.
    pub fn invalidate_rankings(&self) {
        self.queries.invalidate_all();
        self.stats.invalidate(STATS_KEY);
    }

    pub fn clear(&self) {
        self.documents.clear();
        self.queries.clear();
        self.stats.clear();
        tracing::info!("cache cleared");
    }

    pub fn reset_metrics(&self) {
        self.documents.reset_metrics();
        self.queries.reset_metrics();
        self.stats.reset_metrics();
    }

    pub fn metrics(&self) -> CacheMetrics {
        let document = self.documents.metrics();
        let query = self.queries.metrics();
        let stats = self.stats.metrics();
        let aggregate = RegionMetrics::new(
            document.hits + query.hits + stats.hits,
            document.misses + query.misses + stats.misses,
        );
        CacheMetrics {
            enabled: self.is_enabled(),
            backend: self.backend.name().to_string(),
            document,
            query,
            stats,
            aggregate,
        }
    }
}
