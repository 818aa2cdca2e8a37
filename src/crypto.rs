//! Proof-of-work digest functions
//!
//! The worker pool only relies on the [`PowHasher`] signature: a deterministic,
//! side-effect free map from a pre-image to a 32-byte digest. Eaglesong is
//! the default; Blake2s-256 is available for pools that use it.

use crate::config::PowAlgorithm;
use crate::types::{Target, DIGEST_SIZE};
use blake2::{Blake2s256, Digest};
use std::sync::Arc;

/// A deterministic proof-of-work hash function
pub trait PowHasher: Send + Sync {
    /// Hash name for logging
    fn name(&self) -> &'static str;

    /// Compute the digest of `input`
    fn digest(&self, input: &[u8]) -> [u8; DIGEST_SIZE];

    /// Hash `input` and check the digest against `target`
    fn hash_and_check(&self, input: &[u8], target: &Target) -> (bool, [u8; DIGEST_SIZE]) {
        let hash = self.digest(input);
        (target.is_met_by(&hash), hash)
    }
}

/// Blake2s-256 digest
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake2sHasher;

impl Blake2sHasher {
    /// Create a new Blake2s hasher
    pub fn new() -> Self {
        Self
    }
}

impl PowHasher for Blake2sHasher {
    fn name(&self) -> &'static str {
        "blake2s-256"
    }

    fn digest(&self, input: &[u8]) -> [u8; DIGEST_SIZE] {
        Blake2s256::digest(input).into()
    }
}

/// Eaglesong digest, as used by CKB pools
#[derive(Debug, Clone, Copy, Default)]
pub struct EaglesongHasher;

impl EaglesongHasher {
    /// Create a new Eaglesong hasher
    pub fn new() -> Self {
        Self
    }
}

impl PowHasher for EaglesongHasher {
    fn name(&self) -> &'static str {
        "eaglesong"
    }

    fn digest(&self, input: &[u8]) -> [u8; DIGEST_SIZE] {
        let mut output = [0u8; DIGEST_SIZE];
        eaglesong::eaglesong(input, &mut output);
        output
    }
}

/// Hasher for the configured algorithm
pub fn hasher_for(algorithm: PowAlgorithm) -> Arc<dyn PowHasher> {
    match algorithm {
        PowAlgorithm::Eaglesong => Arc::new(EaglesongHasher::new()),
        PowAlgorithm::Blake2s => Arc::new(Blake2sHasher::new()),
    }
}
