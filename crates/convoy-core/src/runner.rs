//! Sequential bundle execution
//!
//! Runs an approved bundle through the executor contract in forward order.
//! The remote head hash decides where execution starts: a freshly approved
//! bundle reports its own hash (position zero), a partially executed bundle
//! reports the commitment of the next pending transaction, and a cleared
//! head means the bundle already ran to completion. Any failure stops the
//! run immediately; completed transactions stay completed and a later run
//! resumes from the head.

use crate::bundle::TransactionBundle;
use crate::executor::ExecutorClient;
use ethers::types::{Address, H256, U256};
use ethers::utils::get_contract_address;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Added on top of each transaction's inner gas limit to cover the
/// executor contract's own dispatch overhead.
pub const DEFAULT_GAS_MARGIN: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Gas added to the inner limit for the outer transaction
    pub gas_margin: u64,

    /// Re-derive and check deployment addresses before each creation
    pub verify_predicted: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            gas_margin: DEFAULT_GAS_MARGIN,
            verify_predicted: true,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Transactions already executed before this run started
    pub skipped: usize,
    /// Transactions executed by this run
    pub executed: usize,
    /// Bundle size
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Executor head {remote:?} does not belong to bundle {bundle:?}")]
    UnknownRemoteHead { bundle: H256, remote: H256 },

    #[error("Transaction {index} would deploy to {actual:?} instead of {expected:?}")]
    AddressMismatch {
        index: usize,
        expected: Address,
        actual: Address,
    },

    #[error("Transaction {index} ({hash:?}) failed after {completed} completed transactions")]
    Transaction {
        index: usize,
        hash: H256,
        completed: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Execution cancelled before transaction {next_index} ({completed} completed)")]
    Cancelled { next_index: usize, completed: usize },

    #[error("Failed to query executor state")]
    Executor(#[source] anyhow::Error),
}

/// Drives an approved bundle through the executor, one transaction per
/// confirmed block.
pub struct BundleRunner {
    executor: Arc<dyn ExecutorClient>,
    config: RunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl BundleRunner {
    pub fn new(
        executor: Arc<dyn ExecutorClient>,
        config: RunnerConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            executor,
            config,
            shutdown,
        }
    }

    /// Execute every pending transaction of `bundle` in order.
    ///
    /// `predicted_deployments` holds the build-time deployment addresses in
    /// creation order; each creation is checked against it before being
    /// submitted so a drifted executor nonce aborts the run instead of
    /// deploying to the wrong address.
    pub async fn run(
        &self,
        bundle: &TransactionBundle,
        predicted_deployments: &[Address],
    ) -> Result<ExecutionReport, ExecuteError> {
        let total = bundle.len();
        if bundle.is_empty() {
            info!(bundle = ?bundle.hash, "Bundle is empty, nothing to execute");
            return Ok(ExecutionReport {
                skipped: 0,
                executed: 0,
                total: 0,
            });
        }

        let remote = self
            .executor
            .next_transaction_hash()
            .await
            .map_err(ExecuteError::Executor)?;
        if remote.is_zero() {
            info!(bundle = ?bundle.hash, "Executor head is cleared, bundle already fully executed");
            return Ok(ExecutionReport {
                skipped: total,
                executed: 0,
                total,
            });
        }

        let start = match bundle.position_of(remote) {
            Some(position) => position,
            None => {
                return Err(ExecuteError::UnknownRemoteHead {
                    bundle: bundle.hash,
                    remote,
                })
            }
        };
        if start == 0 {
            info!(bundle = ?bundle.hash, total = total, "Executing transaction bundle");
        } else {
            info!(
                bundle = ?bundle.hash,
                skipped = start,
                remaining = total - start,
                "Resuming partially executed bundle"
            );
        }

        // Creations before the start index already consumed their nonces.
        let mut creation_ordinal = bundle.transactions[..start]
            .iter()
            .filter(|tx| tx.is_create)
            .count();
        let mut executed = 0usize;

        for (index, tx) in bundle.transactions.iter().enumerate().skip(start) {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(
                    next_index = index,
                    completed = executed,
                    "Execution cancelled, bundle can be resumed later"
                );
                return Err(ExecuteError::Cancelled {
                    next_index: index,
                    completed: executed,
                });
            }

            if tx.is_create {
                if self.config.verify_predicted {
                    self.verify_prediction(index, creation_ordinal, predicted_deployments)
                        .await?;
                }
                creation_ordinal += 1;
            }

            let outer_gas_limit = tx.gas_limit + U256::from(self.config.gas_margin);
            debug!(
                index = index,
                is_create = tx.is_create,
                gas_limit = %outer_gas_limit,
                "Submitting transaction"
            );

            self.executor
                .execute_transaction(tx, outer_gas_limit)
                .await
                .map_err(|source| ExecuteError::Transaction {
                    index,
                    hash: tx.commitment_hash(),
                    completed: executed,
                    source,
                })?;

            executed += 1;
            info!(
                index = index + 1,
                total = total,
                is_create = tx.is_create,
                "Transaction executed"
            );
        }

        info!(
            bundle = ?bundle.hash,
            executed = executed,
            skipped = start,
            "Bundle execution complete"
        );
        Ok(ExecutionReport {
            skipped: start,
            executed,
            total,
        })
    }

    /// The executor account's next CREATE must land on the address the
    /// build predicted for this creation ordinal.
    async fn verify_prediction(
        &self,
        index: usize,
        ordinal: usize,
        predicted: &[Address],
    ) -> Result<(), ExecuteError> {
        let expected = match predicted.get(ordinal) {
            Some(address) => *address,
            None => {
                debug!(
                    index = index,
                    ordinal = ordinal,
                    "No predicted address recorded, skipping check"
                );
                return Ok(());
            }
        };

        let nonce = self
            .executor
            .transaction_count()
            .await
            .map_err(ExecuteError::Executor)?;
        let actual = get_contract_address(self.executor.address(), nonce);
        if actual != expected {
            return Err(ExecuteError::AddressMismatch {
                index,
                expected,
                actual,
            });
        }
        debug!(index = index, address = ?expected, "Predicted deployment address confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RawTransaction;
    use crate::bundle::CompiledTransaction;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use ethers::types::{Bytes, TransactionReceipt};
    use std::sync::Mutex;

    struct RecordingExecutor {
        address: Address,
        head: H256,
        nonce: Mutex<U256>,
        fail_at: Option<usize>,
        calls: Mutex<Vec<(H256, U256)>>,
    }

    impl RecordingExecutor {
        fn new(head: H256, nonce: u64) -> Self {
            Self {
                address: Address::repeat_byte(0xEE),
                head,
                nonce: Mutex::new(U256::from(nonce)),
                fail_at: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(H256, U256)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutorClient for RecordingExecutor {
        fn address(&self) -> Address {
            self.address
        }

        async fn next_transaction_hash(&self) -> Result<H256> {
            Ok(self.head)
        }

        async fn transaction_count(&self) -> Result<U256> {
            Ok(*self.nonce.lock().unwrap())
        }

        async fn approve_bundle(&self, _hash: H256) -> Result<TransactionReceipt> {
            Ok(TransactionReceipt::default())
        }

        async fn execute_transaction(
            &self,
            tx: &CompiledTransaction,
            outer_gas_limit: U256,
        ) -> Result<TransactionReceipt> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_at == Some(calls.len()) {
                return Err(anyhow!("execution reverted"));
            }
            calls.push((tx.commitment_hash(), outer_gas_limit));
            if tx.is_create {
                let mut nonce = self.nonce.lock().unwrap();
                *nonce += U256::one();
            }
            Ok(TransactionReceipt::default())
        }
    }

    fn call_tx(byte: u8, gas: u64) -> RawTransaction {
        RawTransaction {
            to: Some(Address::repeat_byte(0xAA)),
            data: Bytes::from(vec![byte; 4]),
            gas_limit: U256::from(gas),
        }
    }

    fn deploy_tx(byte: u8, gas: u64) -> RawTransaction {
        RawTransaction {
            to: None,
            data: Bytes::from(vec![byte; 8]),
            gas_limit: U256::from(gas),
        }
    }

    fn runner(executor: Arc<RecordingExecutor>) -> BundleRunner {
        BundleRunner::new(executor, RunnerConfig::default(), Arc::new(AtomicBool::new(false)))
    }

    #[tokio::test]
    async fn test_executes_full_bundle_in_order_with_gas_margin() {
        let bundle = TransactionBundle::compile(&[
            call_tx(0x01, 100_000),
            call_tx(0x02, 250_000),
            call_tx(0x03, 75_000),
        ]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 0));

        let report = runner(executor.clone()).run(&bundle, &[]).await.unwrap();

        assert_eq!(
            report,
            ExecutionReport {
                skipped: 0,
                executed: 3,
                total: 3
            }
        );
        let calls = executor.calls();
        assert_eq!(calls.len(), 3);
        for (call, tx) in calls.iter().zip(&bundle.transactions) {
            assert_eq!(call.0, tx.commitment_hash());
            assert_eq!(call.1, tx.gas_limit + U256::from(DEFAULT_GAS_MARGIN));
        }
    }

    #[tokio::test]
    async fn test_failure_stops_the_run_immediately() {
        let bundle = TransactionBundle::compile(&[
            call_tx(0x01, 100_000),
            call_tx(0x02, 100_000),
            call_tx(0x03, 100_000),
        ]);
        let mut executor = RecordingExecutor::new(bundle.hash, 0);
        executor.fail_at = Some(1);
        let executor = Arc::new(executor);

        let err = runner(executor.clone()).run(&bundle, &[]).await.unwrap_err();

        match err {
            ExecuteError::Transaction {
                index,
                hash,
                completed,
                ..
            } => {
                assert_eq!(index, 1);
                assert_eq!(hash, bundle.transactions[1].commitment_hash());
                assert_eq!(completed, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_resumes_from_the_remote_head() {
        let bundle = TransactionBundle::compile(&[
            call_tx(0x01, 100_000),
            call_tx(0x02, 100_000),
            call_tx(0x03, 100_000),
        ]);
        let head = bundle.transactions[1].commitment_hash();
        let executor = Arc::new(RecordingExecutor::new(head, 0));

        let report = runner(executor.clone()).run(&bundle, &[]).await.unwrap();

        assert_eq!(
            report,
            ExecutionReport {
                skipped: 1,
                executed: 2,
                total: 3
            }
        );
        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, bundle.transactions[1].commitment_hash());
        assert_eq!(calls[1].0, bundle.transactions[2].commitment_hash());
    }

    #[tokio::test]
    async fn test_cleared_head_means_already_executed() {
        let bundle = TransactionBundle::compile(&[call_tx(0x01, 100_000)]);
        let executor = Arc::new(RecordingExecutor::new(H256::zero(), 0));

        let report = runner(executor.clone()).run(&bundle, &[]).await.unwrap();

        assert_eq!(
            report,
            ExecutionReport {
                skipped: 1,
                executed: 0,
                total: 1
            }
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_head_is_rejected() {
        let bundle = TransactionBundle::compile(&[call_tx(0x01, 100_000)]);
        let foreign = H256::repeat_byte(0x99);
        let executor = Arc::new(RecordingExecutor::new(foreign, 0));

        let err = runner(executor.clone()).run(&bundle, &[]).await.unwrap_err();

        match err {
            ExecuteError::UnknownRemoteHead { bundle: b, remote } => {
                assert_eq!(b, bundle.hash);
                assert_eq!(remote, foreign);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_bundle_is_a_noop() {
        let bundle = TransactionBundle::compile(&[]);
        let executor = Arc::new(RecordingExecutor::new(H256::zero(), 0));

        let report = runner(executor.clone()).run(&bundle, &[]).await.unwrap();

        assert_eq!(
            report,
            ExecutionReport {
                skipped: 0,
                executed: 0,
                total: 0
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_before_first_transaction() {
        let bundle = TransactionBundle::compile(&[call_tx(0x01, 100_000)]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 0));
        let runner = BundleRunner::new(
            executor.clone(),
            RunnerConfig::default(),
            Arc::new(AtomicBool::new(true)),
        );

        let err = runner.run(&bundle, &[]).await.unwrap_err();

        match err {
            ExecuteError::Cancelled {
                next_index,
                completed,
            } => {
                assert_eq!(next_index, 0);
                assert_eq!(completed, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_creation_address_is_verified_before_deploying() {
        let bundle = TransactionBundle::compile(&[deploy_tx(0x60, 900_000), call_tx(0x01, 100_000)]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 7));
        let predicted = vec![get_contract_address(executor.address, 7u64)];

        let report = runner(executor.clone()).run(&bundle, &predicted).await.unwrap();

        assert_eq!(report.executed, 2);
        assert_eq!(executor.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_creation_address_mismatch_aborts_before_deploying() {
        let bundle = TransactionBundle::compile(&[deploy_tx(0x60, 900_000)]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 7));
        // Prediction made against a stale nonce
        let predicted = vec![get_contract_address(executor.address, 6u64)];

        let err = runner(executor.clone()).run(&bundle, &predicted).await.unwrap_err();

        match err {
            ExecuteError::AddressMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 0);
                assert_eq!(expected, predicted[0]);
                assert_eq!(actual, get_contract_address(executor.address, 7u64));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_accounts_for_earlier_creations() {
        // Two creations then a call; the first creation already executed.
        let bundle = TransactionBundle::compile(&[
            deploy_tx(0x60, 900_000),
            deploy_tx(0x61, 900_000),
            call_tx(0x01, 100_000),
        ]);
        let head = bundle.transactions[1].commitment_hash();
        let executor = Arc::new(RecordingExecutor::new(head, 8));
        let predicted = vec![
            get_contract_address(executor.address, 7u64),
            get_contract_address(executor.address, 8u64),
        ];

        let report = runner(executor.clone()).run(&bundle, &predicted).await.unwrap();

        assert_eq!(
            report,
            ExecutionReport {
                skipped: 1,
                executed: 2,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn test_verification_can_be_disabled() {
        let bundle = TransactionBundle::compile(&[deploy_tx(0x60, 900_000)]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 7));
        let runner = BundleRunner::new(
            executor.clone(),
            RunnerConfig {
                gas_margin: DEFAULT_GAS_MARGIN,
                verify_predicted: false,
            },
            Arc::new(AtomicBool::new(false)),
        );
        // Wrong prediction, but verification is off
        let predicted = vec![Address::repeat_byte(0x11)];

        let report = runner.run(&bundle, &predicted).await.unwrap();
        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn test_missing_prediction_skips_the_check() {
        let bundle = TransactionBundle::compile(&[deploy_tx(0x60, 900_000)]);
        let executor = Arc::new(RecordingExecutor::new(bundle.hash, 7));

        let report = runner(executor.clone()).run(&bundle, &[]).await.unwrap();
        assert_eq!(report.executed, 1);
    }
}
