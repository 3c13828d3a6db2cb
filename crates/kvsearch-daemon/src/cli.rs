//! CLI argument parsing for the kvsearch daemon.
//!
//! CLI flags override all other config sources.

use clap::{Parser, Subcommand};

/// kvsearch daemon
///
/// Mirrors an etcd key prefix into an in-memory full-text index and serves
/// search over gRPC.
#[derive(Parser, Debug)]
#[command(name = "kvsearch-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/kvsearch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon in the foreground
    Start {
        /// Override gRPC port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the watched key prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Override seconds between reconciliation scans
        #[arg(long)]
        scan_interval: Option<u64>,
    },

    /// Search a running daemon
    Search {
        /// gRPC endpoint
        #[arg(short, long, default_value = "http://[::1]:50051")]
        endpoint: String,

        /// Query text
        query: String,

        /// Maximum results (0 = server default)
        #[arg(short = 'n', long, default_value = "0")]
        limit: u32,
    },

    /// Show index freshness of a running daemon
    Status {
        /// gRPC endpoint
        #[arg(short, long, default_value = "http://[::1]:50051")]
        endpoint: String,
    },

    /// List raw store entries through a running daemon
    Entries {
        /// gRPC endpoint
        #[arg(short, long, default_value = "http://[::1]:50051")]
        endpoint: String,

        /// Prefix to list (default: the daemon's prefix)
        #[arg(long, default_value = "")]
        prefix: String,
    },

    /// Write sample experiment records into etcd
    Seed {
        /// Number of records to write
        #[arg(long, default_value = "1000")]
        count: usize,

        /// Seconds between writes
        #[arg(long, default_value = "5")]
        interval_secs: u64,

        /// Override the key prefix
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start() {
        let cli = Cli::parse_from(["kvsearch-daemon", "start", "--port", "9000", "--prefix", "exp/"]);
        match cli.command {
            Commands::Start {
                port,
                prefix,
                scan_interval,
            } => {
                assert_eq!(port, Some(9000));
                assert_eq!(prefix.as_deref(), Some("exp/"));
                assert_eq!(scan_interval, None);
            }
            _ => panic!("Expected Start command"),
        }
    }

    #[test]
    fn test_cli_search() {
        let cli = Cli::parse_from(["kvsearch-daemon", "search", "canary", "-n", "5"]);
        match cli.command {
            Commands::Search {
                endpoint,
                query,
                limit,
            } => {
                assert_eq!(endpoint, "http://[::1]:50051");
                assert_eq!(query, "canary");
                assert_eq!(limit, 5);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "kvsearch-daemon",
            "--config",
            "/tmp/kvsearch.toml",
            "--log-level",
            "debug",
            "status",
        ]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/kvsearch.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Status { .. }));
    }

    #[test]
    fn test_cli_seed_defaults() {
        let cli = Cli::parse_from(["kvsearch-daemon", "seed"]);
        match cli.command {
            Commands::Seed {
                count,
                interval_secs,
                prefix,
            } => {
                assert_eq!(count, 1000);
                assert_eq!(interval_secs, 5);
                assert!(prefix.is_none());
            }
            _ => panic!("Expected Seed command"),
        }
    }
}
