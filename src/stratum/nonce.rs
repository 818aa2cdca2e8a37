//! Nonce handling for the stratum protocol
//!
//! The pool assigns Nonce1 (high bits, fixed per connection) and the width of
//! Nonce2 (low bits, chosen by the miner). Both are integers; the full nonce
//! is the 64-bit value `nonce1 << (8 * nonce2_size) | nonce2`.

use crate::error::{Error, Result};

/// Width of Nonce2 in bytes (1-8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NonceSize(u8);

impl NonceSize {
    /// Largest supported width
    pub const MAX: u8 = 8;

    /// Create a new nonce size (1-8 bytes)
    pub fn new(size: u8) -> Result<Self> {
        if (1..=Self::MAX).contains(&size) {
            Ok(NonceSize(size))
        } else {
            Err(Error::nonce(format!(
                "Invalid nonce2 size: {}, must be 1-{}",
                size,
                Self::MAX
            )))
        }
    }

    /// Get the size in bytes
    pub fn as_bytes(&self) -> u8 {
        self.0
    }

    /// Number of hex digits in the wire representation
    pub fn hex_width(&self) -> usize {
        self.0 as usize * 2
    }

    /// Get the maximum value for this nonce size
    pub fn max_value(&self) -> u64 {
        if self.0 >= Self::MAX {
            u64::MAX
        } else {
            (1u64 << (self.0 as u32 * 8)) - 1
        }
    }
}

impl Default for NonceSize {
    fn default() -> Self {
        NonceSize(4)
    }
}

impl std::fmt::Display for NonceSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool-controlled nonce prefix, fixed for the life of the connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extranonce1 {
    hex: String,
    value: u64,
}

impl Extranonce1 {
    /// Parse from the hex string sent in the subscribe result.
    ///
    /// An empty string is a zero prefix.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let value = if hex.is_empty() {
            0
        } else {
            u64::from_str_radix(hex, 16)
                .map_err(|e| Error::nonce(format!("Invalid nonce1 hex {:?}: {}", hex, e)))?
        };
        Ok(Self {
            hex: hex.to_string(),
            value,
        })
    }

    /// Hex representation exactly as the pool sent it
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Integer value of the prefix
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Check that the prefix leaves room for a Nonce2 of `size` bytes in 64 bits
    pub fn check_fits(&self, size: NonceSize) -> Result<()> {
        let free_bits = 64 - size.as_bytes() as u32 * 8;
        let overflow = self.value.checked_shr(free_bits).unwrap_or(self.value);
        if overflow != 0 {
            return Err(Error::nonce(format!(
                "nonce1 {} does not fit in 64 bits with a {}-byte nonce2",
                self.hex, size
            )));
        }
        Ok(())
    }

    /// Full 64-bit nonce for `nonce2`
    pub fn combine(&self, nonce2: &Nonce2) -> u64 {
        let shift = nonce2.size.as_bytes() as u32 * 8;
        self.value.checked_shl(shift).unwrap_or(0) | nonce2.value
    }
}

impl std::fmt::Display for Extranonce1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Miner-controlled nonce suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce2 {
    size: NonceSize,
    value: u64,
}

impl Nonce2 {
    /// Create a new Nonce2
    pub fn new(size: NonceSize, value: u64) -> Result<Self> {
        if value <= size.max_value() {
            Ok(Nonce2 { size, value })
        } else {
            Err(Error::nonce(format!(
                "Nonce2 value {} exceeds maximum {} for size {} bytes",
                value,
                size.max_value(),
                size.as_bytes()
            )))
        }
    }

    /// Build from a raw counter, reduced modulo the nonce space
    pub fn wrapping(size: NonceSize, counter: u64) -> Self {
        Nonce2 {
            size,
            value: counter & size.max_value(),
        }
    }

    /// Get the nonce size
    pub fn size(&self) -> NonceSize {
        self.size
    }

    /// Get the nonce value
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Zero-padded big-endian hex, `2 * size` digits
    pub fn to_hex(&self) -> String {
        format!("{:0width$x}", self.value, width = self.size.hex_width())
    }
}

impl std::fmt::Display for Nonce2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Write the candidate pre-image into `buf`: the full nonce as 8 big-endian
/// bytes, then the job's powHash.
///
/// The buffer is cleared first so workers can reuse one allocation.
pub fn build_preimage(pow_hash: &[u8], nonce1: &Extranonce1, nonce2: &Nonce2, buf: &mut Vec<u8>) {
    buf.clear();
    buf.extend_from_slice(&nonce1.combine(nonce2).to_be_bytes());
    buf.extend_from_slice(pow_hash);
}
