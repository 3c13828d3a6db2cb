//! kvsearch daemon library
//!
//! Provides CLI parsing and command implementations for the daemon binary.

pub mod cli;
pub mod commands;
pub mod seed;

pub use cli::{Cli, Commands};
pub use commands::{handle_entries, handle_search, handle_seed, handle_status, start_daemon};
pub use seed::{seed_key, ExperimentRecord};
