//! Core types for stratum mining
//!
//! Target arithmetic and hash rate values shared by the pool session, the
//! worker pool and the rate aggregator.

use crate::{Error, Result};
use num_bigint::BigUint;
use std::fmt;

/// Size of a digest and of a target in bytes
pub const DIGEST_SIZE: usize = 32;

/// Mining target representing the difficulty threshold
///
/// A digest read as a big-endian unsigned integer meets the target when it is
/// numerically less than or equal to it. The zero target accepts nothing a
/// real hash function produces, so it doubles as the "not yet set" state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// 256-bit value as big-endian bytes, left-padded with zeros
    bytes: [u8; DIGEST_SIZE],
}

impl Target {
    /// The unset target
    pub fn zero() -> Self {
        Self {
            bytes: [0u8; DIGEST_SIZE],
        }
    }

    /// Maximum possible target (every digest qualifies)
    pub fn max() -> Self {
        Self {
            bytes: [0xFFu8; DIGEST_SIZE],
        }
    }

    /// Create a target from big-endian bytes
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self { bytes }
    }

    /// Create a target from an integer value
    pub fn from_biguint(value: &BigUint) -> Result<Self> {
        if value.bits() > (DIGEST_SIZE as u64) * 8 {
            return Err(Error::target(format!(
                "value has {} bits, exceeds 256",
                value.bits()
            )));
        }

        let be = value.to_bytes_be();
        let mut bytes = [0u8; DIGEST_SIZE];
        let start = DIGEST_SIZE - be.len();
        bytes[start..].copy_from_slice(&be);
        Ok(Self { bytes })
    }

    /// Parse a pool-supplied hex target.
    ///
    /// Any number of digits is accepted, including odd lengths, as long as the
    /// value fits in 256 bits.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.is_empty() {
            return Err(Error::target("empty target string"));
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::target(format!("non-hex characters in {:?}", hex)));
        }

        let value = BigUint::parse_bytes(hex.as_bytes(), 16)
            .ok_or_else(|| Error::target(format!("cannot parse {:?}", hex)))?;
        Self::from_biguint(&value)
    }

    /// Get the target as big-endian bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.bytes
    }

    /// Whether this is the unset target
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Check if a digest meets this target (digest <= target)
    pub fn is_met_by(&self, digest: &[u8; DIGEST_SIZE]) -> bool {
        // Equal-width big-endian byte strings order the same way as the integers
        digest.as_slice() <= self.bytes.as_slice()
    }

    /// Zero-padded 64 digit hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash rate in hashes per second
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HashRate(pub f64);

impl HashRate {
    /// Create new hash rate
    pub fn new(rate: f64) -> Self {
        Self(rate)
    }

    /// Rate from a hash count observed over `elapsed_secs`
    pub fn from_count(hashes: u64, elapsed_secs: f64) -> Self {
        if elapsed_secs > 0.0 {
            Self(hashes as f64 / elapsed_secs)
        } else {
            Self(0.0)
        }
    }

    /// Get the rate value
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s", "PH/s", "EH/s"];
        let mut rate = self.0.max(0.0);
        let mut unit_index = 0;

        while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
            rate /= 1000.0;
            unit_index += 1;
        }

        write!(f, "{:.3} {}", rate, UNITS[unit_index])
    }
}
