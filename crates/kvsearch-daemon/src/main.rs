//! kvsearch daemon
//!
//! Mirrors an etcd key prefix into an in-memory full-text index and serves
//! search over gRPC.
//!
//! # Usage
//!
//! ```bash
//! kvsearch-daemon start [--port PORT] [--prefix PREFIX] [--scan-interval SECS]
//! kvsearch-daemon search "query text" [-n LIMIT]
//! kvsearch-daemon status
//! kvsearch-daemon entries [--prefix PREFIX]
//! kvsearch-daemon seed [--count N] [--interval-secs SECS]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/kvsearch/config.toml)
//! 3. Environment variables (KVSEARCH_*)
//! 4. CLI flags

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use kvsearch_daemon::{
    handle_entries, handle_search, handle_seed, handle_status, start_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            port,
            prefix,
            scan_interval,
        } => {
            start_daemon(
                cli.config.as_deref(),
                port,
                prefix.as_deref(),
                scan_interval,
                cli.log_level.as_deref(),
            )
            .await?;
        }
        Commands::Search {
            endpoint,
            query,
            limit,
        } => {
            handle_search(&endpoint, &query, limit).await?;
        }
        Commands::Status { endpoint } => {
            handle_status(&endpoint).await?;
        }
        Commands::Entries { endpoint, prefix } => {
            handle_entries(&endpoint, &prefix).await?;
        }
        Commands::Seed {
            count,
            interval_secs,
            prefix,
        } => {
            handle_seed(
                cli.config.as_deref(),
                prefix.as_deref(),
                cli.log_level.as_deref(),
                count,
                Duration::from_secs(interval_secs),
            )
            .await?;
        }
    }

    Ok(())
}
