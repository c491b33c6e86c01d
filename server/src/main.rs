use anyhow::Result;
use axum::Router;
use clap::{Parser, ValueEnum};
use search_core::{BackendConfig, EngineConfig, RankerKind, SearchEngine};
use search_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Memory,
    Sled,
}

#[derive(Parser)]
struct Args {
    /// Host to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
    /// JSON engine config; flags below override it
    #[arg(long, env = "ENGINE_CONFIG")]
    config: Option<PathBuf>,
    /// Enable or disable the result cache
    #[arg(long, env = "ENABLE_CACHE")]
    enable_cache: Option<bool>,
    /// Cache backend
    #[arg(long, env = "CACHE_BACKEND", value_enum)]
    cache_backend: Option<Backend>,
    /// Directory for the sled backend (temporary if unset)
    #[arg(long, env = "CACHE_PATH")]
    cache_path: Option<PathBuf>,
    #[arg(long, env = "DOC_TTL_SECS")]
    doc_ttl_secs: Option<u64>,
    #[arg(long, env = "QUERY_TTL_SECS")]
    query_ttl_secs: Option<u64>,
    #[arg(long, env = "STATS_TTL_SECS")]
    stats_ttl_secs: Option<u64>,
    /// Ranking strategy
    #[arg(long, env = "RANKER")]
    ranker: Option<RankerKind>,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(enabled) = self.enable_cache {
            config.enable_cache = enabled;
        }
        match self.cache_backend {
            Some(Backend::Memory) => config.cache.backend = BackendConfig::Memory,
            Some(Backend::Sled) => config.cache.backend = BackendConfig::Sled { path: self.cache_path.clone() },
            None => {}
        }
        if let Some(secs) = self.doc_ttl_secs {
            config.cache.document_ttl_secs = secs;
        }
        if let Some(secs) = self.query_ttl_secs {
            config.cache.query_ttl_secs = secs;
        }
        if let Some(secs) = self.stats_ttl_secs {
            config.cache.stats_ttl_secs = secs;
        }
        if let Some(kind) = self.ranker {
            config.ranker = kind;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let engine = Arc::new(SearchEngine::new(args.engine_config()?));
    let app: Router = build_app(engine);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
