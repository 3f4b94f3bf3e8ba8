//! Bundle approval polling
//!
//! Execution must not start before the executor contract reports the
//! bundle's head hash as approved. The gate polls the read-only head at a
//! fixed interval; transient read failures are logged and tolerated since
//! the read is idempotent. Expiry and cancellation are the only ways out
//! besides approval.

use crate::executor::ExecutorClient;
use ethers::types::H256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Interval between remote head reads; zero falls back to the default
    pub poll_interval: Duration,

    /// Give up after this long; `None` waits until approval or cancellation
    pub deadline: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            deadline: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Bundle {hash:?} was not approved within {waited:?}")]
    TimedOut { hash: H256, waited: Duration },

    #[error("Approval wait for bundle {hash:?} was cancelled")]
    Cancelled { hash: H256 },
}

/// Polls the executor until it reports the expected bundle head.
pub struct ApprovalGate {
    executor: Arc<dyn ExecutorClient>,
    config: GateConfig,
    shutdown: Arc<AtomicBool>,
}

impl ApprovalGate {
    pub fn new(
        executor: Arc<dyn ExecutorClient>,
        config: GateConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            executor,
            config,
            shutdown,
        }
    }

    /// Wait until the executor's head equals `hash`.
    ///
    /// The first read happens immediately; afterwards the loop wakes once
    /// per `poll_interval`. The shutdown flag and the deadline are checked
    /// between reads, never mid-request.
    pub async fn wait_for_approval(&self, hash: H256) -> Result<(), ApprovalError> {
        // tokio's interval panics on a zero period.
        let period = if self.config.poll_interval.is_zero() {
            warn!("Configured poll interval is zero, using the default");
            GateConfig::default().poll_interval
        } else {
            self.config.poll_interval
        };

        info!(
            bundle = ?hash,
            interval_ms = period.as_millis() as u64,
            deadline = ?self.config.deadline,
            "Waiting for bundle approval"
        );

        let started = Instant::now();
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(bundle = ?hash, "Approval wait cancelled");
                return Err(ApprovalError::Cancelled { hash });
            }
            if let Some(deadline) = self.config.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    warn!(bundle = ?hash, waited_secs = waited.as_secs(), "Approval wait timed out");
                    return Err(ApprovalError::TimedOut { hash, waited });
                }
            }

            interval.tick().await;

            match self.executor.next_transaction_hash().await {
                Ok(remote) if remote == hash => {
                    info!(
                        bundle = ?hash,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Bundle approved"
                    );
                    return Ok(());
                }
                Ok(remote) => {
                    debug!(bundle = ?hash, remote = ?remote, "Bundle not yet approved");
                }
                Err(e) => {
                    // The head read is idempotent, so keep polling until the
                    // deadline decides otherwise.
                    warn!(bundle = ?hash, error = %e, "Failed to read executor head, will retry");
                }
            }
        }
    }
}
