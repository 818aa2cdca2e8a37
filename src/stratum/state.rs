//! Session state shared between the receive loop and the workers

use crate::error::{Error, Result};
use crate::hashrate::MinerStats;
use crate::stratum::job::{Job, JobStore};
use crate::stratum::protocol::Subscription;
use crate::types::Target;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};

/// Everything the workers need to search, plus the counters they feed
#[derive(Debug, Default)]
pub struct SessionState {
    subscription: OnceLock<Subscription>,
    target: RwLock<Arc<Target>>,
    jobs: JobStore,
    stats: Arc<MinerStats>,
}

impl SessionState {
    /// Fresh state: no subscription, zero target, no job
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the subscribe result. May only happen once per session.
    pub fn set_subscription(&self, subscription: Subscription) -> Result<()> {
        self.subscription
            .set(subscription)
            .map_err(|_| Error::invalid_state("subscription already established"))
    }

    /// Parameters from the subscribe result, once the handshake got that far
    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.get()
    }

    /// Current share target
    pub fn target(&self) -> Arc<Target> {
        Arc::clone(&self.target.read())
    }

    /// Replace the share target, returning the previous one
    pub fn set_target(&self, target: Target) -> Arc<Target> {
        std::mem::replace(&mut *self.target.write(), Arc::new(target))
    }

    /// Job holder
    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Snapshot of the current job
    pub fn current_job(&self) -> Option<Arc<Job>> {
        self.jobs.current()
    }

    /// Hash and share counters
    pub fn stats(&self) -> &Arc<MinerStats> {
        &self.stats
    }
}
