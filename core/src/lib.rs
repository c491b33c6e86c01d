//! In-memory TF-IDF search engine with a three-region result cache.

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod ranker;
pub mod tokenizer;

pub use backend::{CacheBackend, DisconnectedBackend, MemoryBackend, SledBackend};
pub use cache::{CacheMetrics, Region, RegionMetrics};
pub use config::{BackendConfig, CacheConfig, EngineConfig};
pub use engine::{
    BatchOutcome, ClearCacheOutcome, DocumentInput, EngineStats, PerformanceStats, SearchEngine, SearchHit,
    DEFAULT_TOP_N,
};
pub use error::{BackendError, Result, SearchError};
pub use index::{DocId, Document, InvertedIndex, Metadata};
pub use ranker::{Explanation, Ranker, RankerKind, TfIdfRanker};
pub use tokenizer::{tokenize, Analyzer, AnalyzerConfig};
