//! Sdax Daemon - the learning SDCH proxy.
//!
//! Fronts one origin, ingests the response bodies flowing through it,
//! and serves VCDIFF deltas against a continuously resynthesized shared
//! dictionary to clients that advertise SDCH support.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sdax_engine::{
    queue::{DEFAULT_CAPACITY, DEFAULT_WORKERS},
    Codec, DirDictStore, Engine, EngineConfig, IngestQueue, VcdiffCodec,
};
use sdax_proxy::{build_router, ProxyConfig, ProxyState, UpstreamClient};
use sdax_store::{ChunkStore, MemoryChunkStore, RocksChunkStore};

/// Learning SDCH proxy daemon.
#[derive(Parser)]
#[command(name = "sdaxd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "sdaxd.toml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Origin URL (overrides the config file)
    #[arg(long)]
    origin: Option<String>,
}

/// Daemon configuration.
#[derive(Debug, Clone)]
struct DaemonConfig {
    /// Listen address
    listen: SocketAddr,
    /// Origin URL
    origin: String,
    /// Dictionary content directory
    dict_dir: PathBuf,
    /// Dictionary header directory
    hdr_dir: PathBuf,
    /// Chunk store backing: "memory" or "rocksdb"
    store_backend: String,
    /// Chunk store path (rocksdb backend only)
    store_path: PathBuf,
    /// Ingest queue capacity
    queue_capacity: usize,
    /// Ingest worker count
    workers: usize,
    /// Content-type prefixes eligible for the engine
    content_types: Vec<String>,
    /// External vcdiff program
    codec_program: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".parse().expect("static address"),
            origin: "http://localhost:80/".to_string(),
            dict_dir: PathBuf::from("/var/tmp/sdax/dicts"),
            hdr_dir: PathBuf::from("/var/tmp/sdax/headers"),
            store_backend: "memory".to_string(),
            store_path: PathBuf::from("/var/tmp/sdax/chunks"),
            queue_capacity: DEFAULT_CAPACITY,
            workers: DEFAULT_WORKERS,
            content_types: vec!["text/html".to_string()],
            codec_program: "vcdiff".to_string(),
        }
    }
}

/// Load configuration from a TOML file, falling back to defaults.
fn load_config(path: &PathBuf) -> Result<DaemonConfig> {
    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(DaemonConfig::default());
    }

    let content = std::fs::read_to_string(path).context("Failed to read config file")?;
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = DaemonConfig::default();

    if let Some(listen) = toml.get("listen").and_then(|v| v.as_str()) {
        config.listen = listen.parse().context("Invalid listen address")?;
    }
    if let Some(origin) = toml.get("origin").and_then(|v| v.as_str()) {
        config.origin = origin.to_string();
    }

    if let Some(dictionary) = toml.get("dictionary") {
        if let Some(dir) = dictionary.get("dir").and_then(|v| v.as_str()) {
            config.dict_dir = PathBuf::from(dir);
        }
        if let Some(dir) = dictionary.get("header_dir").and_then(|v| v.as_str()) {
            config.hdr_dir = PathBuf::from(dir);
        }
    }

    if let Some(store) = toml.get("store") {
        if let Some(backend) = store.get("backend").and_then(|v| v.as_str()) {
            config.store_backend = backend.to_string();
        }
        if let Some(path) = store.get("path").and_then(|v| v.as_str()) {
            config.store_path = PathBuf::from(path);
        }
    }

    if let Some(ingest) = toml.get("ingest") {
        if let Some(capacity) = ingest.get("queue_capacity").and_then(|v| v.as_integer()) {
            config.queue_capacity = capacity.max(1) as usize;
        }
        if let Some(workers) = ingest.get("workers").and_then(|v| v.as_integer()) {
            config.workers = workers.max(1) as usize;
        }
        if let Some(types) = ingest.get("content_types").and_then(|v| v.as_array()) {
            config.content_types = types
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect();
        }
    }

    if let Some(codec) = toml.get("codec") {
        if let Some(program) = codec.get("program").and_then(|v| v.as_str()) {
            config.codec_program = program.to_string();
        }
    }

    Ok(config)
}

fn open_chunk_store(config: &DaemonConfig) -> Result<Arc<dyn ChunkStore>> {
    match config.store_backend.as_str() {
        "memory" => Ok(Arc::new(MemoryChunkStore::new())),
        "rocksdb" => {
            let store = RocksChunkStore::open(&config.store_path)
                .context("Failed to open chunk store")?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown store backend {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let mut config = load_config(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(origin) = cli.origin {
        config.origin = origin;
    }

    let origin: reqwest::Url = config.origin.parse().context("Invalid origin URL")?;
    let domain = origin
        .host_str()
        .context("Origin URL has no host")?
        .to_string();
    let port = origin
        .port_or_known_default()
        .context("Origin URL has no port")?;

    info!("Starting sdaxd");
    info!("Listen address: {}", config.listen);
    info!("Origin: {} ({}:{})", origin, domain, port);
    info!("Dictionary directory: {:?}", config.dict_dir);

    let chunks = open_chunk_store(&config)?;
    let dicts = Arc::new(
        DirDictStore::open(&config.dict_dir, &config.hdr_dir)
            .context("Failed to open dictionary directories")?,
    );
    let codec: Arc<dyn Codec> = Arc::new(VcdiffCodec::with_program(&config.codec_program));

    let engine = Arc::new(Engine::new(
        EngineConfig { domain, port },
        chunks,
        dicts,
        codec,
    ));

    match engine.bootstrap().context("Dictionary bootstrap failed")? {
        Some(hash) => info!("Adopted dictionary {} from disk", hash.name()),
        None => info!("No dictionary on disk, starting cold"),
    }

    let queue = IngestQueue::new(config.queue_capacity);
    let workers = sdax_engine::queue::spawn_workers(engine.clone(), queue.clone(), config.workers);

    let state = Arc::new(ProxyState {
        engine: engine.clone(),
        queue: queue.clone(),
        upstream: UpstreamClient::new(origin),
        config: ProxyConfig {
            content_types: config.content_types.clone(),
        },
    });
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .context("Failed to bind listen address")?;
    info!("Proxy listening on {}", config.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = signal::ctrl_c().await {
                tracing::error!(%error, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    queue.close();
    for worker in workers {
        let _ = worker.await;
    }

    let stats = engine.stats();
    info!(
        bodies = stats.bodies_ingested,
        chunks = stats.chunks_recorded,
        dictionaries = stats.dicts_published,
        deltas = stats.deltas_served,
        bytes_saved = stats.delta_bytes_saved,
        "Daemon stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = DaemonConfig::default();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.store_backend, "memory");
        assert_eq!(config.content_types, vec!["text/html"]);
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let config = load_config(&PathBuf::from("/nonexistent/sdaxd.toml")).unwrap();
        assert_eq!(config.queue_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }
}
