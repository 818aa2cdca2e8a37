//! Hash rate accounting
//!
//! Workers bump a shared [`HashCounter`] once per attempt. The
//! [`RateAggregator`] drains it on a fixed period and logs the rate together
//! with share counts.

use crate::types::HashRate;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Hashes computed since the last aggregation
#[derive(Debug, Default)]
pub struct HashCounter {
    count: AtomicU64,
}

impl HashCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one hash attempt
    #[inline]
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current value without resetting
    pub fn load(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Read and reset in one atomic step.
    ///
    /// Increments racing with this call land in either this window or the
    /// next one, never in neither.
    pub fn take(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }
}

/// Share counters for the lifetime of the session
#[derive(Debug, Default)]
pub struct ShareStats {
    found: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`ShareStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareSnapshot {
    /// Shares that met the target locally
    pub found: u64,
    /// Shares the pool accepted
    pub accepted: u64,
    /// Shares the pool rejected
    pub rejected: u64,
}

impl ShareStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// A worker found a qualifying nonce
    pub fn record_found(&self) {
        self.found.fetch_add(1, Ordering::Relaxed);
    }

    /// The pool acknowledged a share
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// The pool refused a share
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self) -> ShareSnapshot {
        ShareSnapshot {
            found: self.found.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Counters shared between the workers, the session and the aggregator
#[derive(Debug, Default)]
pub struct MinerStats {
    /// Hash attempts since the last report
    pub hashes: HashCounter,
    /// Share outcomes
    pub shares: ShareStats,
}

impl MinerStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }
}

/// One aggregation window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReport {
    /// Hashes counted in the window
    pub hashes: u64,
    /// Time since the previous sample
    pub interval: Duration,
    /// `hashes / interval`
    pub rate: HashRate,
    /// Share totals at the end of the window
    pub shares: ShareSnapshot,
}

impl fmt::Display for RateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hashrate: {} ({} hashes in {}), shares found/accepted/rejected: {}/{}/{}",
            self.rate,
            self.hashes,
            humantime::format_duration(self.interval),
            self.shares.found,
            self.shares.accepted,
            self.shares.rejected
        )
    }
}

/// Periodic reader of the hash counter
pub struct RateAggregator {
    interval: Duration,
    stats: Arc<MinerStats>,
    last_sample: Instant,
}

impl RateAggregator {
    /// Create an aggregator reporting every `interval`
    pub fn new(interval: Duration, stats: Arc<MinerStats>) -> Self {
        Self {
            interval,
            stats,
            last_sample: Instant::now(),
        }
    }

    /// Drain the counter and compute the rate since the previous sample
    pub fn sample(&mut self) -> RateReport {
        let now = Instant::now();
        let hashes = self.stats.hashes.take();
        let elapsed = now.duration_since(self.last_sample);
        self.last_sample = now;

        RateReport {
            hashes,
            interval: elapsed,
            rate: HashRate::from_count(hashes, elapsed.as_secs_f64()),
            shares: self.stats.shares.snapshot(),
        }
    }

    /// Report every interval until cancelled.
    ///
    /// The first report fires one full interval after start.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(interval = %humantime::format_duration(self.interval), "Rate aggregator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sample();
                    info!(rate = report.rate.value(), "{}", report);
                }
                _ = cancellation.cancelled() => break,
            }
        }

        debug!("Rate aggregator stopped");
    }
}
