//! CPU nonce search loop
//!
//! Each iteration claims a nonce from the current job, builds the pre-image,
//! hashes it and compares the digest with the current target. Job and target
//! are re-read every iteration so updates from the pool take effect on the
//! next attempt.

use super::Share;
use crate::crypto::PowHasher;
use crate::stratum::nonce::build_preimage;
use crate::stratum::state::SessionState;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Result of a single search iteration
#[derive(Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    /// No subscription or no job yet
    NotReady,
    /// Digest did not meet the target
    Miss,
    /// Digest met the target
    Found(Share),
}

/// One search loop, run on its own thread
pub struct SearchWorker {
    id: usize,
    state: Arc<SessionState>,
    hasher: Arc<dyn PowHasher>,
    shares: mpsc::UnboundedSender<Share>,
    job_wait: Duration,
    cancellation: CancellationToken,
    preimage: Vec<u8>,
}

impl SearchWorker {
    /// Create a worker
    pub fn new(
        id: usize,
        state: Arc<SessionState>,
        hasher: Arc<dyn PowHasher>,
        shares: mpsc::UnboundedSender<Share>,
        job_wait: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            id,
            state,
            hasher,
            shares,
            job_wait,
            cancellation,
            preimage: Vec::with_capacity(64),
        }
    }

    /// Try one nonce
    pub fn step(&mut self) -> SearchOutcome {
        let Some(subscription) = self.state.subscription() else {
            return SearchOutcome::NotReady;
        };
        let Some(job) = self.state.current_job() else {
            return SearchOutcome::NotReady;
        };

        let nonce2 = job.claim_nonce(subscription.nonce2_size);
        build_preimage(
            job.pow_hash_bytes(),
            &subscription.nonce1,
            &nonce2,
            &mut self.preimage,
        );

        let target = self.state.target();
        let (meets, hash) = self.hasher.hash_and_check(&self.preimage, &target);

        let stats = self.state.stats();
        stats.hashes.increment();

        if meets {
            stats.shares.record_found();
            trace!(
                worker = self.id,
                preimage = %hex::encode(&self.preimage),
                hash = %hex::encode(hash),
                target = %target.to_hex(),
                "Solution"
            );
            SearchOutcome::Found(Share {
                job_id: job.job_id().to_string(),
                nonce2,
                hash,
            })
        } else {
            SearchOutcome::Miss
        }
    }

    /// Search until cancelled
    pub fn run(mut self) {
        debug!(worker = self.id, "Worker started");

        while !self.cancellation.is_cancelled() {
            match self.step() {
                SearchOutcome::Miss => {}
                SearchOutcome::Found(share) => self.submit(share),
                SearchOutcome::NotReady => {
                    warn!(
                        worker = self.id,
                        "job not ready, sleeping for {}",
                        humantime::format_duration(self.job_wait)
                    );
                    // Woken early by the pool on shutdown
                    thread::park_timeout(self.job_wait);
                }
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }

    fn submit(&self, share: Share) {
        info!(
            worker = self.id,
            job_id = %share.job_id,
            nonce2 = %share.nonce2,
            hash = %hex::encode(share.hash),
            "Found share"
        );

        if self.shares.send(share).is_err() {
            warn!(worker = self.id, "Share submitter is gone, dropping share");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake2sHasher;
    use crate::stratum::job::Job;
    use crate::stratum::nonce::{Extranonce1, NonceSize};
    use crate::stratum::protocol::Subscription;
    use crate::types::{Target, DIGEST_SIZE};
    use assert_matches::assert_matches;

    /// Digest is the low byte of the full nonce repeated
    struct NonceLowByteHasher;

    impl PowHasher for NonceLowByteHasher {
        fn name(&self) -> &'static str {
            "nonce-low-byte"
        }

        fn digest(&self, input: &[u8]) -> [u8; DIGEST_SIZE] {
            [input[7]; DIGEST_SIZE]
        }
    }

    fn worker(
        state: &Arc<SessionState>,
        hasher: Arc<dyn PowHasher>,
    ) -> (SearchWorker, mpsc::UnboundedReceiver<Share>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SearchWorker::new(
            0,
            Arc::clone(state),
            hasher,
            tx,
            Duration::from_millis(1),
            CancellationToken::new(),
        );
        (worker, rx)
    }

    fn subscribe(state: &SessionState, nonce2_size: u8) {
        state
            .set_subscription(Subscription {
                subscription_id: "sub1".to_string(),
                nonce1: Extranonce1::from_hex("1234abcd").unwrap(),
                nonce2_size: NonceSize::new(nonce2_size).unwrap(),
            })
            .unwrap();
    }

    #[test]
    fn test_not_ready_without_subscription_or_job() {
        let state = Arc::new(SessionState::new());
        let (mut worker, _rx) = worker(&state, Arc::new(Blake2sHasher::new()));

        assert_eq!(worker.step(), SearchOutcome::NotReady);

        state.jobs().publish(Job::new("job42", "deadbeef").unwrap());
        assert_eq!(worker.step(), SearchOutcome::NotReady);

        subscribe(&state, 4);
        assert_ne!(worker.step(), SearchOutcome::NotReady);
        assert_eq!(state.stats().hashes.load(), 1);
    }

    #[test]
    fn test_step_hashes_expected_preimage() {
        let state = Arc::new(SessionState::new());
        subscribe(&state, 4);
        state.set_target(Target::max());
        state.jobs().publish(Job::new("job42", "deadbeef").unwrap());

        let (mut worker, _rx) = worker(&state, Arc::new(Blake2sHasher::new()));
        let outcome = worker.step();

        let expected = Blake2sHasher::new().digest(&hex::decode("1234abcd00000000deadbeef").unwrap());
        assert_matches!(outcome, SearchOutcome::Found(share) => {
            assert_eq!(share.job_id, "job42");
            assert_eq!(share.nonce2.to_hex(), "00000000");
            assert_eq!(share.hash, expected);
        });
        assert_eq!(state.stats().shares.snapshot().found, 1);
    }

    #[test]
    fn test_zero_target_finds_nothing() {
        let state = Arc::new(SessionState::new());
        subscribe(&state, 2);
        state.jobs().publish(Job::new("job42", "deadbeef").unwrap());

        let (mut worker, _rx) = worker(&state, Arc::new(Blake2sHasher::new()));
        for _ in 0..100 {
            assert_eq!(worker.step(), SearchOutcome::Miss);
        }
        assert_eq!(state.stats().hashes.load(), 100);
        assert_eq!(state.stats().shares.snapshot().found, 0);
    }

    #[test]
    fn test_target_and_job_updates_apply_next_iteration() {
        let state = Arc::new(SessionState::new());
        subscribe(&state, 1);
        state.jobs().publish(Job::new("a", "00").unwrap());
        state.set_target(Target::from_bytes([0x01; DIGEST_SIZE]));

        let (mut worker, _rx) = worker(&state, Arc::new(NonceLowByteHasher));

        // nonce2 = 0x00 -> digest all zeros, meets
        assert_matches!(worker.step(), SearchOutcome::Found(share) if share.nonce2.value() == 0);
        // nonce2 = 0x01 -> digest all 0x01, equal to target, meets
        assert_matches!(worker.step(), SearchOutcome::Found(share) if share.nonce2.value() == 1);
        // nonce2 = 0x02 -> above target
        assert_eq!(worker.step(), SearchOutcome::Miss);

        state.set_target(Target::max());
        assert_matches!(worker.step(), SearchOutcome::Found(share) if share.nonce2.value() == 3);

        state.jobs().publish(Job::new("b", "00").unwrap());
        assert_matches!(
            worker.step(),
            SearchOutcome::Found(share) if share.job_id == "b" && share.nonce2.value() == 0
        );
    }

    #[test]
    fn test_run_sends_shares_until_cancelled() {
        let state = Arc::new(SessionState::new());
        subscribe(&state, 4);
        state.set_target(Target::max());
        state.jobs().publish(Job::new("job42", "deadbeef").unwrap());

        let (worker, mut rx) = worker(&state, Arc::new(Blake2sHasher::new()));
        let cancellation = worker.cancellation.clone();
        let handle = thread::spawn(move || worker.run());

        let share = rx.blocking_recv().unwrap();
        assert_eq!(share.job_id, "job42");

        cancellation.cancel();
        handle.join().unwrap();
    }
}
