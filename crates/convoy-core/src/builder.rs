//! Raw transaction construction
//!
//! Turns a declarative bundle definition into low-level transaction
//! payloads. The pass is pure and synchronous: the only outside input is
//! the executor account's transaction count, sampled once by the caller
//! before the build starts.
//!
//! Deploy steps consume nonces, register their predicted address, and emit
//! creation payloads; call steps resolve their target and arguments against
//! what earlier steps registered. Any inconsistency aborts the build before
//! a single byte reaches the network.

use crate::artifact::{ArtifactStore, ContractArtifact};
use crate::bundle::TransactionBundle;
use crate::definition::{BundleDefinition, BundleStep};
use crate::error::{BuildError, StepError};
use crate::placeholder::resolve_arguments;
use crate::registry::ContractRegistry;
use crate::tokens::coerce_arguments;
use ethers::abi::ParamType;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::get_contract_address;
use serde_json::Value;
use tracing::{debug, info};

/// A low-level transaction payload produced from one bundle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    /// Recipient; `None` marks a contract creation
    pub to: Option<Address>,

    /// Creation or call data
    pub data: Bytes,

    /// Gas limit forwarded to the executor for this step
    pub gas_limit: U256,
}

/// Everything a bundle build produces.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// One raw transaction per definition step, in order
    pub transactions: Vec<RawTransaction>,

    /// Name registry populated by the deploy steps
    pub registry: ContractRegistry,

    /// Predicted creation addresses, in deployment order
    pub predicted_deployments: Vec<Address>,
}

/// Build raw transactions for every step of `definition`, in order.
///
/// `executor` is the executor contract's account and `starting_nonce` its
/// transaction count at planning time; the Nth deploy step lands at the
/// address derived from `(executor, starting_nonce + N)`. The prediction
/// holds only while no other creation is performed by that account.
pub fn build_raw_transactions(
    definition: &BundleDefinition,
    artifacts: &ArtifactStore,
    executor: Address,
    starting_nonce: U256,
) -> Result<BuildOutput, StepError> {
    let mut registry = ContractRegistry::new();
    let mut transactions = Vec::with_capacity(definition.len());
    let mut predicted_deployments = Vec::with_capacity(definition.deploy_count());
    let mut nonce = starting_nonce;

    for (index, step) in definition.steps.iter().enumerate() {
        let built = match step {
            BundleStep::Deploy {
                contract,
                name,
                arguments,
                gas_limit,
            } => deploy_transaction(
                contract,
                name.as_deref(),
                arguments,
                *gas_limit,
                artifacts,
                &mut registry,
                &mut predicted_deployments,
                executor,
                &mut nonce,
            ),
            BundleStep::Call {
                target,
                function,
                arguments,
                gas_limit,
            } => call_transaction(target, function, arguments, *gas_limit, &registry),
        };

        let tx = built.map_err(|source| StepError::new(index, step.display_name(), source))?;
        debug!(
            index,
            step = step.display_name(),
            is_create = tx.to.is_none(),
            data_len = tx.data.len(),
            "Built raw transaction"
        );
        transactions.push(tx);
    }

    Ok(BuildOutput {
        transactions,
        registry,
        predicted_deployments,
    })
}

/// A build output paired with its compiled chain, aligned with live
/// executor state.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    pub output: BuildOutput,
    pub bundle: TransactionBundle,
}

/// Build and compile the bundle so it lines up with the executor's current
/// state.
///
/// Every creation the executor performs advances its account nonce, so a
/// head left behind by a partially executed bundle means the live count
/// sits past the base the original build used. Rebuilding at the live
/// count would shift the remaining predictions, and with them any call
/// data that embeds a predicted address. Candidate bases are therefore
/// tried from the live count downwards, one per possible number of
/// already performed creations; a candidate is accepted when the remote
/// head lands at a position preceded by exactly that many creations. A
/// zero head or one matching no candidate yields a fresh build at the
/// live count.
pub fn plan_bundle(
    definition: &BundleDefinition,
    artifacts: &ArtifactStore,
    executor: Address,
    transaction_count: U256,
    remote_head: H256,
) -> Result<BundlePlan, StepError> {
    if !remote_head.is_zero() {
        for consumed in 0..=definition.deploy_count() {
            if U256::from(consumed) > transaction_count {
                break;
            }
            let base = transaction_count - consumed;
            let output = build_raw_transactions(definition, artifacts, executor, base)?;
            let bundle = TransactionBundle::compile(&output.transactions);
            if let Some(position) = bundle.position_of(remote_head) {
                let creations_before = bundle.transactions[..position]
                    .iter()
                    .filter(|tx| tx.is_create)
                    .count();
                if creations_before == consumed {
                    if consumed > 0 {
                        info!(
                            position,
                            consumed_creations = consumed,
                            "Remote head matches a partially executed build, keeping its predictions"
                        );
                    }
                    return Ok(BundlePlan { output, bundle });
                }
            }
        }
        debug!(remote = ?remote_head, "Remote head matches no candidate build");
    }

    let output = build_raw_transactions(definition, artifacts, executor, transaction_count)?;
    let bundle = TransactionBundle::compile(&output.transactions);
    Ok(BundlePlan { output, bundle })
}

#[allow(clippy::too_many_arguments)]
fn deploy_transaction(
    contract: &str,
    name: Option<&str>,
    arguments: &[Value],
    gas_limit: u64,
    artifacts: &ArtifactStore,
    registry: &mut ContractRegistry,
    predicted_deployments: &mut Vec<Address>,
    executor: Address,
    nonce: &mut U256,
) -> Result<RawTransaction, BuildError> {
    let artifact = artifacts
        .get(contract)
        .ok_or_else(|| BuildError::MissingArtifact(contract.to_string()))?;

    let resolved = resolve_arguments(arguments, registry)?;
    let data = encode_constructor(artifact, &resolved)?;

    // The executor account performs the CREATE, so its nonce decides where
    // the contract lands. Call steps do not advance it.
    let predicted = get_contract_address(executor, *nonce);
    *nonce += U256::one();
    predicted_deployments.push(predicted);

    registry.register(name.unwrap_or(contract), predicted, artifact.abi.clone())?;

    Ok(RawTransaction {
        to: None,
        data: data.into(),
        gas_limit: U256::from(gas_limit),
    })
}

fn call_transaction(
    target: &str,
    function_name: &str,
    arguments: &[Value],
    gas_limit: u64,
    registry: &ContractRegistry,
) -> Result<RawTransaction, BuildError> {
    let entry = registry
        .get(target)
        .ok_or_else(|| BuildError::UnknownTarget(target.to_string()))?;

    let function = entry
        .abi
        .function(function_name)
        .map_err(|_| BuildError::UnknownFunction {
            contract: target.to_string(),
            function: function_name.to_string(),
        })?;

    let resolved = resolve_arguments(arguments, registry)?;
    let kinds: Vec<ParamType> = function.inputs.iter().map(|p| p.kind.clone()).collect();
    let tokens = coerce_arguments(&resolved, &kinds)?;
    let data = function.encode_input(&tokens)?;

    Ok(RawTransaction {
        to: Some(entry.address),
        data: data.into(),
        gas_limit: U256::from(gas_limit),
    })
}

fn encode_constructor(
    artifact: &ContractArtifact,
    arguments: &[Value],
) -> Result<Vec<u8>, BuildError> {
    match artifact.abi.constructor() {
        Some(constructor) => {
            let kinds: Vec<ParamType> =
                constructor.inputs.iter().map(|p| p.kind.clone()).collect();
            let tokens = coerce_arguments(arguments, &kinds)?;
            Ok(constructor.encode_input(artifact.bytecode.to_vec(), &tokens)?)
        }
        None if arguments.is_empty() => Ok(artifact.bytecode.to_vec()),
        None => Err(BuildError::UnexpectedConstructorArguments(
            artifact.contract_name.clone(),
            arguments.len(),
        )),
    }
}
