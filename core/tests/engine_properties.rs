use search_core::{
    BackendConfig, CacheConfig, DocumentInput, EngineConfig, Metadata, MemoryBackend, SearchEngine,
};
use std::sync::Arc;

fn engine() -> SearchEngine {
    SearchEngine::with_backend(EngineConfig::default(), Arc::new(MemoryBackend::new()))
}

fn ids(hits: &[search_core::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.id.as_str()).collect()
}

#[test]
fn removing_unknown_id_changes_nothing() {
    let e = engine();
    e.index_document("d1", "cat dog", Metadata::new()).unwrap();
    let before = e.performance_stats().index_size;
    assert!(!e.remove_document("ghost").unwrap());
    assert!(!e.remove_document("ghost").unwrap());
    assert_eq!(e.performance_stats().index_size, before);
}

#[test]
fn reindex_leaves_no_trace_of_old_content() {
    let e = engine();
    e.index_document("d1", "apple banana", Metadata::new()).unwrap();
    e.index_document("d2", "banana", Metadata::new()).unwrap();
    e.index_document("d1", "cherry", Metadata::new()).unwrap();

    assert!(e.search("apple", 10).unwrap().is_empty());
    assert_eq!(ids(&e.search("banana", 10).unwrap()), vec!["d2"]);
    assert_eq!(ids(&e.search("cherry", 10).unwrap()), vec!["d1"]);
    assert_eq!(e.get_stats().term_count, 2);
    e.verify_index().unwrap();
}

#[test]
fn repeated_search_is_served_from_cache() {
    let e = engine();
    e.index_document("d1", "the quick brown fox", Metadata::new()).unwrap();
    e.index_document("d2", "the lazy dog", Metadata::new()).unwrap();

    let first = e.search("quick fox", 10).unwrap();
    let hits_before = e.cache().metrics().query.hits;
    let second = e.search("quick fox", 10).unwrap();
    assert_eq!(serde_json::to_vec(&first).unwrap(), serde_json::to_vec(&second).unwrap());
    assert_eq!(first, second);
    assert_eq!(e.cache().metrics().query.hits, hits_before + 1);
}

#[test]
fn equivalent_queries_share_a_cache_entry() {
    let e = engine();
    e.index_document("d1", "cat dog", Metadata::new()).unwrap();
    e.search("Cat   DOG", 5).unwrap();
    e.search("dog, cat!", 5).unwrap();
    assert_eq!(e.cache().metrics().query.hits, 1);
    // A different limit is a different entry.
    e.search("cat dog", 6).unwrap();
    assert_eq!(e.cache().metrics().query.misses, 2);
}

#[test]
fn mutation_invalidates_cached_rankings() {
    let e = engine();
    e.index_document("d1", "cat dog", Metadata::new()).unwrap();
    let first = e.search("cat", 10).unwrap();
    let misses = e.cache().metrics().query.misses;

    e.index_document("d2", "cat cat cat", Metadata::new()).unwrap();
    let second = e.search("cat", 10).unwrap();
    assert_ne!(first, second);
    assert_eq!(ids(&second), vec!["d2", "d1"]);
    assert_eq!(e.cache().metrics().query.misses, misses + 1);

    e.remove_document("d2").unwrap();
    assert_eq!(ids(&e.search("cat", 10).unwrap()), vec!["d1"]);
}

#[test]
fn higher_term_frequency_ranks_first() {
    let e = engine();
    e.index_document("d1", "cat dog", Metadata::new()).unwrap();
    e.index_document("d2", "cat cat dog", Metadata::new()).unwrap();
    assert_eq!(ids(&e.search("cat", 10).unwrap()), vec!["d2", "d1"]);
}

#[test]
fn empty_corpus_returns_nothing() {
    let e = engine();
    assert!(e.search("anything", 10).unwrap().is_empty());
    assert!(!e.get_stats().is_index_built);
}

#[test]
fn unknown_terms_return_nothing() {
    let e = engine();
    e.index_document("d1", "apple", Metadata::new()).unwrap();
    assert!(e.search("banana", 10).unwrap().is_empty());
}

#[test]
fn zero_ttl_entries_always_miss() {
    let config = EngineConfig {
        cache: CacheConfig { query_ttl_secs: 0, ..CacheConfig::default() },
        ..EngineConfig::default()
    };
    let e = SearchEngine::with_backend(config, Arc::new(MemoryBackend::new()));
    e.index_document("d1", "cat", Metadata::new()).unwrap();
    e.search("cat", 10).unwrap();
    e.search("cat", 10).unwrap();
    let q = e.cache().metrics().query;
    assert_eq!(q.hits, 0);
    assert_eq!(q.misses, 2);
}

#[test]
fn clear_cache_resets_every_region() {
    let e = engine();
    e.index_documents(vec![DocumentInput::new("a", "python programming"), DocumentInput::new("b", "rust programming")]);
    e.search("python", 10).unwrap();
    e.search("python", 10).unwrap();
    e.get_document("a").unwrap();
    e.get_stats();

    assert!(e.clear_cache().success);
    let m = e.cache().metrics();
    assert_eq!(m.aggregate.total(), 0);

    e.search("python", 10).unwrap();
    let m = e.cache().metrics();
    assert_eq!(m.query.hits, 0);
    assert_eq!(m.query.misses, 1);
}

#[test]
fn reset_metrics_keeps_entries() {
    let e = engine();
    e.index_document("d1", "cat", Metadata::new()).unwrap();
    e.search("cat", 10).unwrap();
    e.reset_cache_metrics();
    e.search("cat", 10).unwrap();
    let q = e.cache().metrics().query;
    assert_eq!((q.hits, q.misses), (1, 0));
}

#[test]
fn sled_backed_engine_behaves_like_memory() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        cache: CacheConfig {
            backend: BackendConfig::Sled { path: Some(dir.path().join("cache")) },
            ..CacheConfig::default()
        },
        ..EngineConfig::default()
    };
    let e = SearchEngine::new(config);
    assert_eq!(e.cache().metrics().backend, "sled");
    e.index_document("d1", "cat dog", Metadata::new()).unwrap();
    e.index_document("d2", "cat cat dog", Metadata::new()).unwrap();
    let first = e.search("cat", 10).unwrap();
    let second = e.search("cat", 10).unwrap();
    assert_eq!(first, second);
    assert_eq!(e.cache().metrics().query.hits, 1);

    e.remove_document("d2").unwrap();
    assert_eq!(ids(&e.search("cat", 10).unwrap()), vec!["d1"]);
    assert!(e.performance_stats().backend_healthy);
}

#[test]
fn restarted_engine_ignores_entries_left_in_sled() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        cache: CacheConfig {
            backend: BackendConfig::Sled { path: Some(dir.path().join("cache")) },
            ..CacheConfig::default()
        },
        ..EngineConfig::default()
    };

    let first = SearchEngine::new(config.clone());
    first.index_document("d1", "secret cat", Metadata::new()).unwrap();
    assert!(first.get_document("d1").unwrap().is_some());
    assert_eq!(ids(&first.search("cat", 10).unwrap()), vec!["d1"]);
    assert_eq!(first.get_stats().document_count, 1);
    // Flushes sled so the entries are on disk before the reopen.
    assert!(first.performance_stats().backend_healthy);
    drop(first);

    let restarted = SearchEngine::new(config);
    assert_eq!(restarted.cache().metrics().backend, "sled");
    assert_eq!(restarted.document_count(), 0);
    assert!(restarted.get_document("d1").unwrap().is_none());
    assert!(restarted.search("cat", 10).unwrap().is_empty());
    assert_eq!(restarted.get_stats().document_count, 0);
    assert_eq!(restarted.cache().metrics().aggregate.hits, 0);
}
