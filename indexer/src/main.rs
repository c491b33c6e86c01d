use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use search_core::{DocumentInput, EngineConfig, Metadata, SearchEngine, SearchHit, DEFAULT_TOP_N};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A record as found on disk. `body` and `meta` are accepted for
/// crawler-style dumps; `title` and `url` are folded into metadata.
#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(alias = "doc_id")]
    id: String,
    #[serde(alias = "body")]
    content: String,
    title: Option<String>,
    url: Option<String>,
    #[serde(default, alias = "meta")]
    metadata: Metadata,
}

impl From<InputRecord> for DocumentInput {
    fn from(rec: InputRecord) -> Self {
        let mut metadata = rec.metadata;
        if let Some(title) = rec.title {
            metadata.entry("title").or_insert(title.into());
        }
        if let Some(url) = rec.url {
            metadata.entry("url").or_insert(url.into());
        }
        DocumentInput::new(rec.id, rec.content).with_metadata(metadata)
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Load documents into a TF-IDF search engine and query it", long_about = None)]
struct Cli {
    /// JSON engine config
    #[arg(long, global = true, env = "ENGINE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index JSON/JSONL files (or a directory of them) and optionally run queries
    Load {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Query to run after loading; repeatable
        #[arg(long = "query", short = 'q')]
        queries: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
    },
    /// Measure cold versus warm query latency on a synthetic corpus
    Bench {
        #[arg(long, default_value_t = 5_000)]
        docs: usize,
        #[arg(long, default_value_t = 200)]
        queries: usize,
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
    },
}

#[derive(Serialize)]
struct QueryReport {
    query: String,
    took_ms: f64,
    results: Vec<SearchHit>,
}

#[derive(Serialize)]
struct BenchReport {
    generated_at: String,
    documents: usize,
    queries: usize,
    index_ms: f64,
    cold_mean_us: f64,
    warm_mean_us: f64,
    speedup: f64,
    stats: search_core::EngineStats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Commands::Load { input, queries, top_n } => load(config, &input, &queries, top_n),
        Commands::Bench { docs, queries, top_n } => bench(config, docs, queries, top_n),
    }
}

fn load(config: EngineConfig, input: &Path, queries: &[String], top_n: usize) -> Result<()> {
    let files = collect_files(input)?;
    let mut docs = Vec::new();
    for file in &files {
        docs.extend(read_records(file).with_context(|| format!("reading {}", file.display()))?);
    }

    let engine = SearchEngine::new(config);
    let start = Instant::now();
    let outcome = engine.index_documents(docs);
    tracing::info!(
        files = files.len(),
        indexed = outcome.indexed_count,
        total = outcome.total_count,
        took_ms = millis(start.elapsed()),
        "ingested documents"
    );

    for query in queries {
        let start = Instant::now();
        let results = engine.search(query, top_n)?;
        let report = QueryReport { query: query.clone(), took_ms: millis(start.elapsed()), results };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    println!("{}", serde_json::to_string_pretty(&engine.get_stats())?);
    Ok(())
}

fn collect_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input path {} does not exist", input.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")))
        .collect();
    files.sort();
    Ok(files)
}

/// JSONL is one record per line; JSON is a single record or an array.
/// Records that do not parse are logged and skipped.
fn read_records(file: &Path) -> Result<Vec<DocumentInput>> {
    let reader = BufReader::new(File::open(file)?);
    let values: Vec<serde_json::Value> = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out: Vec<serde_json::Value> = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(v) => out.push(v),
                Err(e) => tracing::warn!(file = %file.display(), line = n + 1, error = %e, "skipping bad line"),
            }
        }
        out
    } else {
        let json: serde_json::Value = serde_json::from_reader(reader)?;
        match json {
            serde_json::Value::Array(arr) => arr,
            v @ serde_json::Value::Object(_) => vec![v],
            _ => Vec::new(),
        }
    };

    Ok(values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<InputRecord>(v) {
            Ok(rec) => Some(rec.into()),
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping malformed record");
                None
            }
        })
        .collect())
}

const VOCABULARY: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
    "uniform", "victor", "whiskey", "xray", "yankee", "zulu", "search", "cache", "index", "rank",
];

/// Deterministic corpus with varying length and term mix per document.
fn synthetic_corpus(n: usize) -> Vec<DocumentInput> {
    (0..n)
        .map(|i| {
            let len = 16 + i % 17;
            let words: Vec<&str> = (0..len).map(|j| VOCABULARY[(i * 7 + j * j * 11 + j) % VOCABULARY.len()]).collect();
            DocumentInput::new(format!("doc_{i}"), words.join(" "))
        })
        .collect()
}

fn synthetic_queries(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let a = VOCABULARY[(i * 3) % VOCABULARY.len()];
            let b = VOCABULARY[(i * 5 + 1) % VOCABULARY.len()];
            format!("{a} {b}")
        })
        .collect()
}

fn bench(config: EngineConfig, docs: usize, queries: usize, top_n: usize) -> Result<()> {
    if queries == 0 {
        bail!("--queries must be at least 1");
    }
    let engine = SearchEngine::new(config);
    if !engine.is_caching_enabled() {
        tracing::warn!("caching is disabled; warm and cold timings will match");
    }

    let start = Instant::now();
    let outcome = engine.index_documents(synthetic_corpus(docs));
    let index_ms = millis(start.elapsed());
    tracing::info!(indexed = outcome.indexed_count, index_ms, "corpus indexed");

    let queries_text = synthetic_queries(queries);
    let cold = time_queries(&engine, &queries_text, top_n)?;
    let warm = time_queries(&engine, &queries_text, top_n)?;
    let cold_mean_us = cold.as_secs_f64() * 1e6 / queries as f64;
    let warm_mean_us = warm.as_secs_f64() * 1e6 / queries as f64;

    let report = BenchReport {
        generated_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        documents: outcome.indexed_count,
        queries,
        index_ms,
        cold_mean_us,
        warm_mean_us,
        speedup: if warm_mean_us > 0.0 { cold_mean_us / warm_mean_us } else { 0.0 },
        stats: engine.get_stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn time_queries(engine: &SearchEngine, queries: &[String], top_n: usize) -> Result<Duration> {
    let start = Instant::now();
    for q in queries {
        engine.search(q, top_n)?;
    }
    Ok(start.elapsed())
}

fn millis(d: Duration) -> f64 { d.as_secs_f64() * 1e3 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_jsonl_and_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"id":"a","content":"rust search"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, "not json").unwrap();
        writeln!(f, r#"{{"doc_id":"b","body":"crawler dump","title":"B","url":"http://b"}}"#).unwrap();
        writeln!(f, r#"{{"id":"c"}}"#).unwrap();

        let docs = read_records(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[1].content, "crawler dump");
        assert_eq!(docs[1].metadata["title"], "B");
        assert_eq!(docs[1].metadata["url"], "http://b");
    }

    #[test]
    fn reads_json_array_and_single_object() {
        let dir = tempfile::tempdir().unwrap();
        let arr = dir.path().join("many.json");
        std::fs::write(&arr, r#"[{"id":"a","content":"x"},{"id":"b","content":"y","metadata":{"k":1}}]"#).unwrap();
        let one = dir.path().join("nested").join("one.json");
        std::fs::create_dir_all(one.parent().unwrap()).unwrap();
        std::fs::write(&one, r#"{"id":"c","content":"z"}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        let docs: Vec<_> = files.iter().flat_map(|f| read_records(f).unwrap()).collect();
        let mut ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(collect_files(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn synthetic_corpus_is_searchable() {
        let engine = SearchEngine::default();
        let outcome = engine.index_documents(synthetic_corpus(50));
        assert_eq!(outcome.indexed_count, 50);
        for q in synthetic_queries(5) {
            let hits = engine.search(&q, 5).unwrap();
            assert!(hits.len() <= 5);
        }
        assert_eq!(synthetic_corpus(3), synthetic_corpus(3));
    }
}
