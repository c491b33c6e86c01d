use crate::error::{Result, SearchError};
use crate::ranker::RankerKind;
use crate::tokenizer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DOCUMENT_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_QUERY_TTL_SECS: u64 = 60 * 60;
pub const DEFAULT_STATS_TTL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    /// `path: None` opens a temporary database.
    Sled {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: BackendConfig,
    pub document_ttl_secs: u64,
    pub query_ttl_secs: u64,
    pub stats_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            document_ttl_secs: DEFAULT_DOCUMENT_TTL_SECS,
            query_ttl_secs: DEFAULT_QUERY_TTL_SECS,
            stats_ttl_secs: DEFAULT_STATS_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn document_ttl(&self) -> Duration { Duration::from_secs(self.document_ttl_secs) }
    pub fn query_ttl(&self) -> Duration { Duration::from_secs(self.query_ttl_secs) }
    pub fn stats_ttl(&self) -> Duration { Duration::from_secs(self.stats_ttl_secs) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enable_cache: bool,
    pub cache: CacheConfig,
    pub ranker: RankerKind,
    pub analyzer: AnalyzerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache: CacheConfig::default(),
            ranker: RankerKind::Tfidf,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let BackendConfig::Sled { path: Some(p) } = &self.cache.backend {
            if p.as_os_str().is_empty() {
                return Err(SearchError::config("sled backend path must not be empty"));
            }
        }
        Ok(())
    }
}
