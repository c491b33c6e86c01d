//! The public face of the core: indexing, lookup, search and stats, with the
//! cache kept consistent with the index.
//!
//! Lock discipline: one `RwLock` guards the index. Mutations hold the write
//! lock through both the index change and the cache invalidation. Reads hold
//! the read lock through probe, compute and populate. A ranking computed
//! from an old index therefore can never be written after the invalidation
//! meant to remove it.

use crate::backend::{open_backend, CacheBackend};
use crate::cache::{query_key, CacheManager, CacheMetrics, STATS_KEY};
use crate::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::index::{DocId, Document, InvertedIndex, Metadata};
use crate::ranker::{Explanation, Ranker, RankerKind};
use crate::tokenizer::Analyzer;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: DocId,
    pub content: String,
    pub metadata: Metadata,
    pub score: f64,
}

/// One entry of a batch index request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInput {
    #[serde(alias = "doc_id")]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentInput {
    pub fn new<I: Into<String>, C: Into<String>>(id: I, content: C) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new() }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub indexed_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearCacheOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub document_count: usize,
    pub term_count: usize,
    pub is_index_built: bool,
    pub ranker_type: String,
    pub cache: CacheMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSize {
    pub documents: usize,
    pub terms: usize,
    pub postings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub index_size: IndexSize,
    pub cache: CacheMetrics,
    pub backend_healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

pub struct SearchEngine {
    analyzer: Analyzer,
    index: RwLock<InvertedIndex>,
    ranker: RwLock<Arc<dyn Ranker>>,
    cache: CacheManager,
}

impl Default for SearchEngine {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

impl SearchEngine {
    /// Build an engine, opening the configured cache backend.
    pub fn new(config: EngineConfig) -> Self {
        let backend = open_backend(&config.cache.backend);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: EngineConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let analyzer = Analyzer::new(config.analyzer);
        tracing::info!(
            ranker = %config.ranker,
            cache_enabled = config.enable_cache,
            backend = backend.name(),
            "search engine initialised"
        );
        let cache = CacheManager::new(backend, &config.cache, config.enable_cache);
        // The index starts empty; anything a persistent backend kept from an
        // earlier engine describes documents that no longer exist.
        cache.clear();
        Self {
            analyzer,
            index: RwLock::new(InvertedIndex::new(analyzer)),
            ranker: RwLock::new(config.ranker.build()),
            cache,
        }
    }

    pub fn cache(&self) -> &CacheManager { &self.cache }

    fn validate_document(id: &str, content: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(SearchError::invalid_input("document id must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(SearchError::invalid_input(format!("document {id:?} has empty content")));
        }
        Ok(())
    }

    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(SearchError::invalid_input("document id must not be empty"));
        }
        Ok(())
    }

    fn validate_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(SearchError::invalid_input("query must not be empty"));
        }
        Ok(())
    }

    /// Append the terms indexed for `id`. Debug builds only.
    fn collect_terms(index: &InvertedIndex, id: &str, into: &mut Vec<String>) {
        if cfg!(debug_assertions) {
            if let Some(doc) = index.get(id) {
                into.extend(doc.term_counts.keys().cloned());
            }
        }
    }

    /// Debug check of the posting lists and documents a mutation touched.
    fn assert_consistent(index: &InvertedIndex, terms: &[String], ids: &[&str]) {
        debug_assert_eq!(
            index
                .verify_terms(terms)
                .and_then(|_| ids.iter().try_for_each(|id| index.verify_document(id)))
                .err()
                .map(|e| e.to_string()),
            None,
            "index inconsistent after mutation"
        );
    }

    pub fn index_document(&self, id: &str, content: &str, metadata: Metadata) -> Result<()> {
        Self::validate_document(id, content)?;
        let mut index = self.index.write();
        let mut touched = Vec::new();
        Self::collect_terms(&index, id, &mut touched);
        index.add_or_replace(id, content, metadata)?;
        Self::collect_terms(&index, id, &mut touched);
        Self::assert_consistent(&index, &touched, &[id]);
        self.cache.invalidate_documents([id]);
        Ok(())
    }

    /// Index every valid entry; invalid ones are skipped and logged.
    pub fn index_documents(&self, docs: Vec<DocumentInput>) -> BatchOutcome {
        let total_count = docs.len();
        let mut indexed: Vec<String> = Vec::with_capacity(total_count);
        let mut touched = Vec::new();
        let mut index = self.index.write();
        for doc in docs {
            let outcome = Self::validate_document(&doc.id, &doc.content).and_then(|_| {
                Self::collect_terms(&index, &doc.id, &mut touched);
                index.add_or_replace(&doc.id, &doc.content, doc.metadata)
            });
            match outcome {
                Ok(()) => {
                    Self::collect_terms(&index, &doc.id, &mut touched);
                    indexed.push(doc.id);
                }
                Err(e) => tracing::warn!(doc_id = %doc.id, error = %e, "skipping document in batch"),
            }
        }
        let ids: Vec<&str> = indexed.iter().map(String::as_str).collect();
        Self::assert_consistent(&index, &touched, &ids);
        if !indexed.is_empty() {
            self.cache.invalidate_documents(ids);
        }
        tracing::info!(indexed = indexed.len(), total = total_count, "batch indexed");
        BatchOutcome { indexed_count: indexed.len(), total_count }
    }

    /// Returns false when the document was not indexed.
    pub fn remove_document(&self, id: &str) -> Result<bool> {
        Self::validate_id(id)?;
        let mut index = self.index.write();
        let mut touched = Vec::new();
        Self::collect_terms(&index, id, &mut touched);
        let removed = index.remove(id);
        if removed {
            Self::assert_consistent(&index, &touched, &[]);
            self.cache.invalidate_documents([id]);
        }
        Ok(removed)
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Self::validate_id(id)?;
        let index = self.index.read();
        let region = self.cache.documents();
        if let Some(doc) = region.and_then(|r| r.get(id)) {
            return Ok(Some(doc));
        }
        let Some(doc) = index.get(id).cloned() else { return Ok(None) };
        if let Some(r) = region {
            r.put(id, &doc);
        }
        Ok(Some(doc))
    }

    /// Rank documents against `query`, best first.
    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<SearchHit>> {
        Self::validate_query(query)?;
        if top_n == 0 {
            return Err(SearchError::invalid_input("top_n must be a positive integer"));
        }
        let terms = self.analyzer.analyze(query);

        let index = self.index.read();
        let ranker = self.ranker.read().clone();
        let key = query_key(&terms, top_n, ranker.kind());
        let region = self.cache.queries();
        if let Some(hits) = region.and_then(|r| r.get(&key)) {
            return Ok(hits);
        }

        let hits: Vec<SearchHit> = ranker
            .score(&index, &terms, top_n)
            .into_iter()
            .filter_map(|(id, score)| {
                index.get(&id).map(|doc| SearchHit {
                    id,
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    score,
                })
            })
            .collect();
        tracing::debug!(query, top_n, hits = hits.len(), "search computed");
        if let Some(r) = region {
            r.put(&key, &hits);
        }
        Ok(hits)
    }

    pub fn get_stats(&self) -> EngineStats {
        let index = self.index.read();
        let region = self.cache.stats();
        if let Some(stats) = region.and_then(|r| r.get(STATS_KEY)) {
            return stats;
        }
        let stats = EngineStats {
            document_count: index.document_count(),
            term_count: index.term_count(),
            is_index_built: index.document_count() > 0,
            ranker_type: self.ranker.read().kind().to_string(),
            cache: self.cache.metrics(),
        };
        if let Some(r) = region {
            r.put(STATS_KEY, &stats);
        }
        stats
    }

    /// Uncached index size and live cache counters.
    pub fn performance_stats(&self) -> PerformanceStats {
        let index_size = {
            let index = self.index.read();
            IndexSize { documents: index.document_count(), terms: index.term_count(), postings: index.posting_count() }
        };
        let backend_healthy = match self.cache.backend().ping() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "cache backend health check failed");
                false
            }
        };
        PerformanceStats { index_size, cache: self.cache.metrics(), backend_healthy }
    }

    pub fn clear_cache(&self) -> ClearCacheOutcome {
        if !self.cache.is_enabled() {
            return ClearCacheOutcome { success: false, reason: Some("caching is disabled".into()) };
        }
        self.cache.clear();
        ClearCacheOutcome { success: true, reason: None }
    }

    pub fn enable_caching(&self) { self.cache.set_enabled(true) }

    pub fn disable_caching(&self) { self.cache.set_enabled(false) }

    pub fn is_caching_enabled(&self) -> bool { self.cache.is_enabled() }

    pub fn reset_cache_metrics(&self) { self.cache.reset_metrics() }

    pub fn ranker_kind(&self) -> RankerKind { self.ranker.read().kind() }

    pub fn available_rankers() -> &'static [RankerKind] { RankerKind::ALL }

    /// Swap the ranking strategy and drop every cached ranking.
    pub fn change_ranker(&self, kind: RankerKind) {
        // Held so no search can cache a result from the old ranker after
        // the invalidation below.
        let _index = self.index.write();
        *self.ranker.write() = kind.build();
        self.cache.invalidate_rankings();
        tracing::info!(ranker = %kind, "ranker changed");
    }

    /// Per-term breakdown of how `doc_id` scores against `query`.
    pub fn explain(&self, query: &str, doc_id: &str) -> Result<Option<Explanation>> {
        Self::validate_query(query)?;
        Self::validate_id(doc_id)?;
        let terms = self.analyzer.analyze(query);
        let index = self.index.read();
        let ranker = self.ranker.read().clone();
        Ok(ranker.explain(&index, &terms, doc_id))
    }

    /// The document's most characteristic terms by tf·idf.
    pub fn document_terms(&self, doc_id: &str, limit: usize) -> Result<Option<Vec<TermWeight>>> {
        Self::validate_id(doc_id)?;
        let index = self.index.read();
        Ok(index
            .top_terms(doc_id, limit)
            .map(|terms| terms.into_iter().map(|(term, weight)| TermWeight { term, weight }).collect()))
    }

    pub fn document_count(&self) -> usize { self.index.read().document_count() }

    pub fn verify_index(&self) -> Result<()> { self.index.read().verify() }
}
