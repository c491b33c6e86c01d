use search_core::{EngineConfig, Metadata, MemoryBackend, SearchEngine};
use std::sync::Arc;
use std::thread;

// Writers flip documents between two versions that use disjoint vocabularies.
// A reader must only ever see one complete version of each document.
#[test]
fn readers_never_see_a_torn_document() {
    let engine = Arc::new(SearchEngine::with_backend(EngineConfig::default(), Arc::new(MemoryBackend::new())));
    for i in 0..20 {
        engine.index_document(&format!("d{i}"), "red red green", Metadata::new()).unwrap();
    }

    thread::scope(|s| {
        for w in 0..2 {
            let engine = &engine;
            s.spawn(move || {
                for round in 0..200 {
                    let id = format!("d{}", (round + w) % 20);
                    let content = if round % 2 == 0 { "blue blue yellow" } else { "red red green" };
                    engine.index_document(&id, content, Metadata::new()).unwrap();
                }
            });
        }
        for _ in 0..4 {
            let engine = &engine;
            s.spawn(move || {
                for _ in 0..200 {
                    let red = engine.search("red", 50).unwrap();
                    let green = engine.search("green", 50).unwrap();
                    let blue = engine.search("blue yellow", 50).unwrap();
                    for hit in red.iter().chain(green.iter()) {
                        assert_eq!(hit.content, "red red green");
                    }
                    for hit in &blue {
                        assert_eq!(hit.content, "blue blue yellow");
                    }
                    let stats = engine.get_stats();
                    assert_eq!(stats.document_count, 20);
                }
            });
        }
    });

    engine.verify_index().unwrap();
    assert_eq!(engine.document_count(), 20);
}

#[test]
fn write_is_visible_to_later_reads_on_other_threads() {
    let engine = Arc::new(SearchEngine::with_backend(EngineConfig::default(), Arc::new(MemoryBackend::new())));
    engine.index_document("seed", "seed", Metadata::new()).unwrap();
    assert!(engine.search("fresh", 10).unwrap().is_empty());

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || engine.index_document("new", "fresh content", Metadata::new()).unwrap())
    };
    writer.join().unwrap();

    let reader = {
        let engine = engine.clone();
        thread::spawn(move || engine.search("fresh", 10).unwrap())
    };
    let hits = reader.join().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "new");
}
