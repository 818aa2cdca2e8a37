//! Stratum mining client protocol

pub mod client;
pub mod connection;
pub mod job;
pub mod nonce;
pub mod protocol;
pub mod state;

pub use client::{ClientConfig, ShareSubmitter, StratumClient, CLIENT_ID};
pub use job::{Job, JobStore};
pub use nonce::{build_preimage, Extranonce1, Nonce2, NonceSize};
pub use protocol::{PoolEvent, PoolMessage, StratumMethod, StratumRequest, SubmitOutcome, Subscription};
pub use state::SessionState;
