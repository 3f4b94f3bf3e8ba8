//! Executor contract binding
//!
//! The executor is the on-chain half of the system: it stores the approved
//! bundle head and runs each chain-linked transaction on request. This
//! module provides the `ExecutorClient` seam the approval gate and runner
//! are written against, plus the ethers-backed implementation over an HTTP
//! JSON-RPC endpoint with a local signer.

use crate::artifact::ContractArtifact;
use crate::bundle::CompiledTransaction;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::contract::{Contract, ContractFactory};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U256};
use std::sync::Arc;
use tracing::{debug, info};

/// The executor contract surface the coordinator depends on.
pub const EXECUTOR_ABI: &str = r#"[
    {
        "inputs": [],
        "name": "nextTransactionHash",
        "outputs": [{ "internalType": "bytes32", "name": "", "type": "bytes32" }],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [{ "internalType": "bytes32", "name": "_transactionHash", "type": "bytes32" }],
        "name": "approveTransactionBundle",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    },
    {
        "inputs": [
            { "internalType": "bytes32", "name": "_nextTransactionHash", "type": "bytes32" },
            { "internalType": "bool", "name": "_isCreate", "type": "bool" },
            { "internalType": "address", "name": "_target", "type": "address" },
            { "internalType": "uint256", "name": "_gasLimit", "type": "uint256" },
            { "internalType": "bytes", "name": "_data", "type": "bytes" }
        ],
        "name": "executeTransaction",
        "outputs": [],
        "stateMutability": "nonpayable",
        "type": "function"
    }
]"#;

/// Signing JSON-RPC client used for all executor interactions.
pub type ExecutorMiddleware = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Read/write surface of the executor contract.
///
/// The approval gate and the bundle runner only speak this trait, so both
/// can be driven by an in-memory implementation in tests.
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// Address of the executor contract account
    fn address(&self) -> Address;

    /// The head hash the executor expects next; the approved bundle hash
    /// right after approval, the zero hash once nothing is pending
    async fn next_transaction_hash(&self) -> Result<H256>;

    /// The executor account's transaction count, i.e. the nonce its next
    /// CREATE will consume
    async fn transaction_count(&self) -> Result<U256>;

    /// Approve a bundle head hash and wait for one confirmation
    async fn approve_bundle(&self, hash: H256) -> Result<TransactionReceipt>;

    /// Submit one chain-linked transaction with the given outer gas limit
    /// and wait for one confirmation; errors on revert
    async fn execute_transaction(
        &self,
        tx: &CompiledTransaction,
        outer_gas_limit: U256,
    ) -> Result<TransactionReceipt>;
}

/// Build a signing client for the given endpoint and key.
///
/// The wallet is bound to a chain id so signatures are replay protected;
/// when `chain_id` is `None` the endpoint is asked for it.
pub async fn connect_client(
    rpc_url: &str,
    private_key: &str,
    chain_id: Option<u64>,
) -> Result<Arc<ExecutorMiddleware>> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
    let chain_id = match chain_id {
        Some(id) => id,
        None => provider
            .get_chainid()
            .await
            .context("Failed to fetch chain ID from RPC endpoint")?
            .as_u64(),
    };

    let wallet = private_key
        .parse::<LocalWallet>()
        .context("Failed to parse private key")?
        .with_chain_id(chain_id);

    info!(
        endpoint = %rpc_url,
        chain_id = chain_id,
        signer = %wallet.address(),
        "Connected signing client"
    );
    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

/// ethers-backed executor binding.
pub struct ExecutorContract {
    contract: Contract<ExecutorMiddleware>,
    client: Arc<ExecutorMiddleware>,
    address: Address,
}

impl ExecutorContract {
    /// Bind the executor contract at `address` over an existing client.
    pub fn new(client: Arc<ExecutorMiddleware>, address: Address) -> Result<Self> {
        let abi: Abi =
            serde_json::from_str(EXECUTOR_ABI).context("Invalid executor ABI definition")?;
        let contract = Contract::new(address, abi, client.clone());
        Ok(Self {
            contract,
            client,
            address,
        })
    }

    /// Connect a signing client and bind the executor in one step.
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        chain_id: Option<u64>,
        address: Address,
    ) -> Result<Self> {
        let client = connect_client(rpc_url, private_key, chain_id).await?;
        Self::new(client, address)
    }

    pub fn client(&self) -> Arc<ExecutorMiddleware> {
        self.client.clone()
    }
}

#[async_trait]
impl ExecutorClient for ExecutorContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn next_transaction_hash(&self) -> Result<H256> {
        let hash = self
            .contract
            .method::<_, H256>("nextTransactionHash", ())?
            .call()
            .await
            .context("Failed to read nextTransactionHash from executor")?;
        Ok(hash)
    }

    async fn transaction_count(&self) -> Result<U256> {
        let count = self
            .client
            .get_transaction_count(self.address, None)
            .await
            .context("Failed to read executor transaction count")?;
        Ok(count)
    }

    async fn approve_bundle(&self, hash: H256) -> Result<TransactionReceipt> {
        info!(bundle = ?hash, executor = ?self.address, "Approving transaction bundle");

        let call = self
            .contract
            .method::<_, ()>("approveTransactionBundle", hash)?;
        let pending = call
            .send()
            .await
            .context("Failed to submit bundle approval")?;
        let receipt = pending
            .confirmations(1)
            .await
            .context("Failed while waiting for the approval confirmation")?
            .context("Approval transaction was dropped from the mempool")?;

        ensure_success(&receipt, "approveTransactionBundle")?;
        info!(tx = ?receipt.transaction_hash, "Bundle approval confirmed");
        Ok(receipt)
    }

    async fn execute_transaction(
        &self,
        tx: &CompiledTransaction,
        outer_gas_limit: U256,
    ) -> Result<TransactionReceipt> {
        debug!(
            next = ?tx.next_transaction_hash,
            is_create = tx.is_create,
            target = ?tx.target,
            gas = %outer_gas_limit,
            "Submitting executeTransaction"
        );

        let call = self
            .contract
            .method::<_, ()>(
                "executeTransaction",
                (
                    tx.next_transaction_hash,
                    tx.is_create,
                    tx.target,
                    tx.gas_limit,
                    tx.data.clone(),
                ),
            )?
            .gas(outer_gas_limit);
        let pending = call
            .send()
            .await
            .context("Failed to submit executeTransaction")?;
        let receipt = pending
            .confirmations(1)
            .await
            .context("Failed while waiting for the execution confirmation")?
            .context("Execution transaction was dropped from the mempool")?;

        ensure_success(&receipt, "executeTransaction")?;
        Ok(receipt)
    }
}

/// Deploy the executor contract itself from its compiler artifact.
///
/// `owner` is the account allowed to approve bundles afterwards. Returns
/// the deployed address once the creation is confirmed.
pub async fn deploy_executor(
    client: Arc<ExecutorMiddleware>,
    artifact: &ContractArtifact,
    owner: Address,
) -> Result<(Address, TransactionReceipt)> {
    info!(contract = %artifact.contract_name, owner = ?owner, "Deploying executor contract");

    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode.clone(), client);
    let deployer = factory
        .deploy(owner)
        .context("Failed to prepare executor deployment")?
        .confirmations(1usize);
    let (instance, receipt) = deployer
        .send_with_receipt()
        .await
        .context("Executor deployment failed")?;

    info!(
        address = ?instance.address(),
        tx = ?receipt.transaction_hash,
        "Executor contract deployed"
    );
    Ok((instance.address(), receipt))
}

fn ensure_success(receipt: &TransactionReceipt, label: &str) -> Result<()> {
    let succeeded = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
    if !succeeded {
        bail!(
            "{} reverted on-chain (tx {:?})",
            label,
            receipt.transaction_hash
        );
    }
    Ok(())
}
