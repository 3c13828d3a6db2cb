//! Command implementations for the kvsearch daemon.
//!
//! Handles:
//! - start: bootstrap the index, run the sync loops and serve gRPC
//! - search/status/entries: query a running daemon
//! - seed: write sample records into etcd

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kvsearch_client::SearchClient;
use kvsearch_index::{IndexConfig, IndexEngine};
use kvsearch_service::pb::{ScanResultStatus, WatcherState};
use kvsearch_service::{run_server_with_shutdown, SearchServiceImpl};
use kvsearch_store::{EtcdStore, EtcdStoreConfig};
use kvsearch_sync::retry::retry_transient;
use kvsearch_sync::{PipelineConfig, RetryConfig, SyncError, SyncPipeline};
use kvsearch_types::Settings;

use crate::seed::{seed_key, ExperimentRecord};

/// Load settings and apply CLI overrides (highest precedence).
fn load_settings(
    config_path: Option<&str>,
    port_override: Option<u16>,
    prefix_override: Option<&str>,
    scan_interval_override: Option<u64>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(port) = port_override {
        settings.grpc_port = port;
    }
    if let Some(prefix) = prefix_override {
        settings.key_prefix = prefix.to_string();
    }
    if let Some(secs) = scan_interval_override {
        settings.scan_interval_secs = secs;
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

fn init_tracing(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Connect to etcd, retrying while the cluster is unreachable.
async fn connect_store(settings: &Settings, cancel: &CancellationToken) -> Result<EtcdStore> {
    let config = EtcdStoreConfig::from(&settings.etcd);
    let retry = RetryConfig::new(
        Duration::from_millis(settings.watcher.backoff_initial_ms),
        Duration::from_millis(settings.watcher.backoff_max_ms),
    );

    let connect = retry_transient(retry, "etcd connect", || {
        let config = config.clone();
        async move { EtcdStore::connect(config).await.map_err(SyncError::from) }
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled.into()),
        store = connect => store.context("Failed to connect to etcd"),
    }
}

/// Start the daemon in the foreground.
///
/// 1. Load configuration and initialize logging
/// 2. Connect to etcd and fill the index from a full snapshot
/// 3. Spawn the watcher and the scanner
/// 4. Serve gRPC until SIGINT/SIGTERM, then stop the sync loops
pub async fn start_daemon(
    config_path: Option<&str>,
    port_override: Option<u16>,
    prefix_override: Option<&str>,
    scan_interval_override: Option<u64>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let settings = load_settings(
        config_path,
        port_override,
        prefix_override,
        scan_interval_override,
        log_level_override,
    )?;
    init_tracing(&settings.log_level)?;

    info!("kvsearch daemon starting...");
    info!("Configuration:");
    info!("  Key prefix: {}", settings.key_prefix);
    info!("  etcd endpoints: {:?}", settings.etcd.endpoints);
    info!("  Scan interval: {}s", settings.scan_interval_secs);
    info!("  gRPC address: {}", settings.grpc_addr());
    info!("  Log level: {}", settings.log_level);

    let addr: SocketAddr = settings
        .grpc_addr()
        .parse()
        .context("Invalid gRPC address")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let store = match connect_store(&settings, &cancel).await {
        Ok(store) => Arc::new(store),
        Err(_) if cancel.is_cancelled() => return Ok(()),
        Err(e) => return Err(e),
    };

    let engine = Arc::new(
        IndexEngine::new(
            IndexConfig::default()
                .with_memory_mb(settings.search.writer_memory_mb)
                .with_fuzzy(settings.search.fuzzy),
        )
        .context("Failed to create search index")?,
    );

    let pipeline = SyncPipeline::new(store.clone(), engine.clone(), PipelineConfig::from(&settings));

    // Queries are only served once the initial sync has filled the index
    let handle = match pipeline.start(cancel.clone()).await {
        Ok(handle) => handle,
        Err(SyncError::Cancelled) => {
            info!("Shutdown requested during initial sync");
            return Ok(());
        }
        Err(e) => return Err(e).context("Initial sync failed"),
    };

    let service = SearchServiceImpl::new(
        engine,
        store,
        pipeline.status(),
        settings.key_prefix.clone(),
        &settings.search,
    );

    let server_shutdown = {
        let cancel = cancel.clone();
        async move { cancel.cancelled().await }
    };
    let result = run_server_with_shutdown(addr, service, server_shutdown).await;

    cancel.cancel();
    handle.join().await;
    info!("kvsearch daemon stopped");

    result.map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

/// Run a search against a running daemon and print the hits.
pub async fn handle_search(endpoint: &str, query: &str, limit: u32) -> Result<()> {
    let mut client = SearchClient::connect(endpoint)
        .await
        .context("Failed to connect to daemon")?;

    let hits = match client.search(query, limit).await {
        Ok(hits) => hits,
        Err(e) if e.is_bad_request() => {
            anyhow::bail!("Invalid query: {}", e);
        }
        Err(e) => return Err(e).context("Search failed"),
    };

    if hits.is_empty() {
        println!("No matches for '{}'", query);
        return Ok(());
    }

    println!("{} match(es) for '{}':", hits.len(), query);
    for hit in hits {
        println!("  {} (score {:.3}, revision {})", hit.id, hit.score, hit.revision);
        let mut fields: Vec<_> = hit.fields.into_iter().collect();
        fields.sort();
        for (name, value) in fields {
            println!("      {}: {}", name, truncate(&value, 80));
        }
    }
    Ok(())
}

/// Print index freshness of a running daemon.
pub async fn handle_status(endpoint: &str) -> Result<()> {
    let mut client = SearchClient::connect(endpoint)
        .await
        .context("Failed to connect to daemon")?;
    let status = client.sync_status().await.context("Status request failed")?;

    let watcher = watcher_state_name(status.watcher_state);
    let last_scan = scan_result_name(status.last_scan_result);

    println!("Prefix:          {}", status.prefix);
    println!("Documents:       {}", status.documents);
    println!("Tombstones:      {}", status.tombstones);
    println!("Last revision:   {}", status.last_revision);
    println!("Watcher:         {} ({} restarts)", watcher, status.watch_restarts);
    match chrono::DateTime::from_timestamp_millis(status.last_scan_ms) {
        Some(at) if status.last_scan_ms > 0 => println!(
            "Last scan:       {} at {} ({} ms)",
            last_scan,
            at.to_rfc3339(),
            status.last_scan_duration_ms
        ),
        _ => println!("Last scan:       never"),
    }
    if let Some(err) = status.last_scan_error {
        println!("Last scan error: {}", err);
    }
    println!(
        "Scans:           {} run, {} failed, {} skipped",
        status.scan_count, status.failed_scans, status.skipped_scans
    );
    println!(
        "Writes:          {} applied, {} stale, {} deleted, {} malformed",
        status.applied, status.stale, status.deleted, status.malformed
    );
    Ok(())
}

/// List raw store entries through a running daemon.
pub async fn handle_entries(endpoint: &str, prefix: &str) -> Result<()> {
    let mut client = SearchClient::connect(endpoint)
        .await
        .context("Failed to connect to daemon")?;
    let entries = client
        .list_entries(prefix)
        .await
        .context("ListEntries request failed")?;

    if entries.is_empty() {
        println!("No entries");
        return Ok(());
    }
    for entry in entries {
        println!("{} @{}  {}", entry.key, entry.revision, truncate(&entry.value, 100));
    }
    Ok(())
}

/// Write `count` sample experiment records, one every `interval`.
pub async fn handle_seed(
    config_path: Option<&str>,
    prefix_override: Option<&str>,
    log_level_override: Option<&str>,
    count: usize,
    interval: Duration,
) -> Result<()> {
    let settings = load_settings(config_path, None, prefix_override, None, log_level_override)?;
    init_tracing(&settings.log_level)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let store = match connect_store(&settings, &cancel).await {
        Ok(store) => store,
        Err(_) if cancel.is_cancelled() => return Ok(()),
        Err(e) => return Err(e),
    };

    info!(prefix = %settings.key_prefix, count, "Seeding experiment records");
    for i in 0..count {
        let record = ExperimentRecord::generate(i);
        let key = seed_key(&settings.key_prefix, &record.uuid);
        let value = serde_json::to_vec(&record).context("Failed to encode record")?;

        match store.put(&key, value).await {
            Ok(revision) => info!(key = %key, revision, "Wrote record"),
            Err(e) => warn!(key = %key, error = %e, "Write failed"),
        }

        if i + 1 < count {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
    Ok(())
}

fn watcher_state_name(raw: i32) -> &'static str {
    match WatcherState::try_from(raw) {
        Ok(WatcherState::Starting) => "starting",
        Ok(WatcherState::Streaming) => "streaming",
        Ok(WatcherState::Recovering) => "recovering",
        Ok(WatcherState::Stopped) => "stopped",
        _ => "unknown",
    }
}

fn scan_result_name(raw: i32) -> &'static str {
    match ScanResultStatus::try_from(raw) {
        Ok(ScanResultStatus::Success) => "success",
        Ok(ScanResultStatus::Failed) => "failed",
        Ok(ScanResultStatus::Skipped) => "skipped",
        _ => "unknown",
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
