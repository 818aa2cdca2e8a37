//! Stratum Mining Client
//!
//! A proof-of-work mining client for stratum pools:
//! - Subscribe/authorize handshake and a receive loop for targets and jobs
//! - Lock-light job store with per-job nonce partitioning
//! - Multi-threaded CPU nonce search with a pluggable digest
//! - Periodic hash rate and share reporting

pub mod config;
pub mod crypto;
pub mod error;
pub mod hashrate;
pub mod stratum;
pub mod types;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Application information
pub const APP_NAME: &str = "stratum-mining-client";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
