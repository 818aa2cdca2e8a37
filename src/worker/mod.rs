//! CPU worker pool
//!
//! A fixed number of OS threads run the nonce search against the shared
//! session state. Qualifying nonces leave the pool as [`Share`]s over an
//! unbounded channel, so a worker never waits on the network.

use crate::crypto::PowHasher;
use crate::error::Result;
use crate::stratum::nonce::Nonce2;
use crate::stratum::state::SessionState;
use crate::types::DIGEST_SIZE;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod cpu;

pub use cpu::{SearchOutcome, SearchWorker};

/// Default pause when there is no job to mine
pub const DEFAULT_JOB_WAIT: Duration = Duration::from_secs(5);

/// A nonce whose digest met the target, ready for `mining.submit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Job the nonce was found for
    pub job_id: String,
    /// Miner-controlled nonce suffix
    pub nonce2: Nonce2,
    /// Digest of the winning pre-image
    pub hash: [u8; DIGEST_SIZE],
}

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads (0 = number of CPUs)
    pub threads: usize,
    /// Pause between retries while no job or subscription is available
    pub job_wait: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            job_wait: DEFAULT_JOB_WAIT,
        }
    }
}

impl WorkerPoolConfig {
    /// Thread count with 0 resolved to the CPU count
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Running set of worker threads
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl WorkerPool {
    /// Spawn the workers. They idle until the session has a subscription and a job.
    pub fn start(
        config: &WorkerPoolConfig,
        state: Arc<SessionState>,
        hasher: Arc<dyn PowHasher>,
        shares: mpsc::UnboundedSender<Share>,
    ) -> Result<Self> {
        let threads = config.resolved_threads();
        let cancellation = CancellationToken::new();

        info!(
            threads,
            hasher = hasher.name(),
            "Starting worker pool"
        );

        let mut handles = Vec::with_capacity(threads);
        for id in 0..threads {
            let worker = SearchWorker::new(
                id,
                Arc::clone(&state),
                Arc::clone(&hasher),
                shares.clone(),
                config.job_wait,
                cancellation.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("miner-worker-{}", id))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }

        Ok(Self {
            handles,
            cancellation,
        })
    }

    /// Number of running workers
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Ask every worker to stop and wait for them
    pub fn stop(self) {
        self.cancellation.cancel();
        for handle in &self.handles {
            handle.thread().unpark();
        }
        for handle in self.handles {
            let name = handle.thread().name().map(str::to_string);
            if handle.join().is_err() {
                debug!(worker = ?name, "Worker thread panicked");
            }
        }
        debug!("Worker pool stopped");
    }
}
