//! Job management for the stratum protocol
//!
//! A [`Job`] is immutable apart from its nonce counter. The [`JobStore`] holds
//! the current job behind a swappable reference: publishing replaces the whole
//! `Arc`, so a reader sees either the old job or the new one, never a mix.

use crate::error::{Error, Result};
use crate::stratum::nonce::{Nonce2, NonceSize};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// One unit of pool-assigned work
#[derive(Debug)]
pub struct Job {
    /// Pool-defined identifier, echoed verbatim in `mining.submit`
    job_id: String,
    /// Pre-image material as the pool sent it
    pow_hash: String,
    /// Decoded pre-image material
    pow_hash_bytes: Vec<u8>,
    /// Next nonce2 counter value; the lock covers read-and-increment only
    nonce_counter: Mutex<u64>,
}

impl Job {
    /// Create a job from a `mining.notify` payload
    pub fn new(job_id: impl Into<String>, pow_hash: impl Into<String>) -> Result<Self> {
        let pow_hash = pow_hash.into();
        let pow_hash_bytes = hex::decode(&pow_hash)
            .map_err(|e| Error::stratum(format!("invalid powHash {:?}: {}", pow_hash, e)))?;

        Ok(Self {
            job_id: job_id.into(),
            pow_hash,
            pow_hash_bytes,
            nonce_counter: Mutex::new(0),
        })
    }

    /// Get the job ID
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Get the pre-image material as hex
    pub fn pow_hash(&self) -> &str {
        &self.pow_hash
    }

    /// Get the decoded pre-image material
    pub fn pow_hash_bytes(&self) -> &[u8] {
        &self.pow_hash_bytes
    }

    /// Hand out the next nonce2 for this job.
    ///
    /// Every call returns a distinct value until `2^(8 * size)` claims have
    /// been made, after which values repeat from zero.
    pub fn claim_nonce(&self, size: NonceSize) -> Nonce2 {
        let mut counter = self.nonce_counter.lock();
        let nonce2 = Nonce2::wrapping(size, *counter);
        *counter = counter.wrapping_add(1);
        nonce2
    }

    /// Number of claims made so far
    pub fn nonces_claimed(&self) -> u64 {
        *self.nonce_counter.lock()
    }
}

/// Holder of the currently published job
#[derive(Debug, Default)]
pub struct JobStore {
    current: RwLock<Option<Arc<Job>>>,
}

impl JobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current job, returning the superseded one
    pub fn publish(&self, job: Job) -> Option<Arc<Job>> {
        let job = Arc::new(job);
        self.current.write().replace(job)
    }

    /// Snapshot of the current job, if any has been published
    pub fn current(&self) -> Option<Arc<Job>> {
        self.current.read().clone()
    }
}
