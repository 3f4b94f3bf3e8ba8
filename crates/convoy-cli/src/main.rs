use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use convoy_config::Config;
use convoy_core::{
    connect_client, plan_bundle, ApprovalGate, ArtifactStore, BuildOutput, BundleDefinition,
    BundlePlan, BundleRunner, BundleStep, CompiledTransaction, ContractArtifact, ExecutorClient,
    ExecutorContract, GateConfig, RunnerConfig, TransactionBundle,
};
use ethers::signers::Signer;
use ethers::types::{Address, H256};
use ethers::utils::to_checksum;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let matches = cli().get_matches();

    let config = if let Some(config_file) = matches.get_one::<String>("config") {
        Config::load_from_file(config_file)?
    } else {
        let config = Config::load_from_env()?;
        config.validate()?;
        config
    };

    init_logging(&config.logging.log_level);

    // A single flag shared by the gate and the runner; Ctrl-C requests a
    // stop at the next transaction boundary instead of killing one mid-air.
    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, stopping at the next transaction boundary");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    match matches.subcommand() {
        Some(("deploy", sub)) => deploy(&config, sub, shutdown).await,
        Some(("deploy-executor", sub)) => deploy_executor_command(&config, sub).await,
        Some(("approve", sub)) => approve(&config, sub).await,
        _ => unreachable!("subcommand is required"),
    }
}

fn cli() -> Command {
    Command::new("convoy")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convoy - transaction bundle construction and execution")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Sets a custom config file"),
        )
        .subcommand(
            Command::new("deploy")
                .about("Build a bundle from a definition, wait for approval and execute it")
                .arg(
                    Arg::new("definition")
                        .short('d')
                        .long("definition")
                        .value_name("FILE")
                        .required(true)
                        .help("Bundle definition JSON file"),
                )
                .arg(
                    Arg::new("executor")
                        .long("executor")
                        .value_name("ADDRESS")
                        .help("Executor contract address (overrides the config)"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_name("FILE")
                        .help("Write the compiled bundle record to this file"),
                )
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .action(ArgAction::SetTrue)
                        .help("Skip the confirmation prompt"),
                ),
        )
        .subcommand(
            Command::new("deploy-executor")
                .about("Deploy a fresh executor contract")
                .arg(
                    Arg::new("artifact")
                        .long("artifact")
                        .value_name("FILE")
                        .help("Executor contract artifact (overrides the config)"),
                )
                .arg(
                    Arg::new("owner")
                        .long("owner")
                        .value_name("ADDRESS")
                        .help("Account allowed to approve bundles (defaults to the signer)"),
                ),
        )
        .subcommand(
            Command::new("approve")
                .about("Approve a compiled bundle hash on the executor")
                .arg(
                    Arg::new("bundle")
                        .long("bundle")
                        .value_name("HASH")
                        .required(true)
                        .help("Bundle head hash to approve"),
                )
                .arg(
                    Arg::new("executor")
                        .long("executor")
                        .value_name("ADDRESS")
                        .help("Executor contract address (overrides the config)"),
                ),
        )
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn deploy(config: &Config, matches: &ArgMatches, shutdown: Arc<AtomicBool>) -> Result<()> {
    let definition_path = matches
        .get_one::<String>("definition")
        .context("--definition is required")?;
    let definition = BundleDefinition::load(definition_path)?;
    if definition.is_empty() {
        println!("Definition contains no steps, nothing to do.");
        return Ok(());
    }

    let artifacts = ArtifactStore::load_dir(&config.artifacts.dir)?;
    let executor_address = resolve_executor_address(config, matches)?;

    let client = connect_client(
        &config.network.rpc_url,
        &config.network.private_key,
        config.network.chain_id,
    )
    .await?;
    let executor: Arc<dyn ExecutorClient> =
        Arc::new(ExecutorContract::new(client, executor_address)?);

    // The live head decides whether this is a fresh build or the
    // continuation of a partially executed bundle whose creations already
    // advanced the executor's account nonce.
    let transaction_count = executor.transaction_count().await?;
    let remote = executor.next_transaction_hash().await?;
    let BundlePlan { output, bundle } = plan_bundle(
        &definition,
        &artifacts,
        executor_address,
        transaction_count,
        remote,
    )?;

    print_plan(&definition, &output, &bundle, executor_address);

    if let Some(out) = matches.get_one::<String>("out") {
        write_bundle_record(out, executor_address, &bundle)?;
        println!("Bundle record written to {out}");
    }

    if !matches.get_flag("yes") && !confirm("Proceed with approval and execution?")? {
        println!("Aborted.");
        return Ok(());
    }

    // A head pointing into this bundle means approval already happened,
    // possibly during an earlier interrupted run.
    if bundle.position_of(remote).is_some() {
        info!(remote = ?remote, "Bundle already approved, skipping the approval wait");
    } else {
        println!(
            "Waiting for approval of bundle {:?} (run `convoy approve --bundle {:?}` as the owner)",
            bundle.hash, bundle.hash
        );
        let gate = ApprovalGate::new(
            executor.clone(),
            GateConfig {
                poll_interval: config.approval.poll_interval(),
                deadline: config.approval.deadline(),
            },
            shutdown.clone(),
        );
        gate.wait_for_approval(bundle.hash).await?;
    }

    let runner = BundleRunner::new(
        executor,
        RunnerConfig {
            gas_margin: config.execution.gas_margin,
            verify_predicted: config.execution.verify_predicted,
        },
        shutdown,
    );
    let report = runner.run(&bundle, &output.predicted_deployments).await?;

    if report.skipped > 0 {
        println!(
            "Skipped {} transaction(s) already executed by an earlier run.",
            report.skipped
        );
    }
    println!(
        "Executed {}/{} transactions. Bundle {:?} complete.",
        report.executed, report.total, bundle.hash
    );
    Ok(())
}

async fn deploy_executor_command(config: &Config, matches: &ArgMatches) -> Result<()> {
    let artifact_path = matches
        .get_one::<String>("artifact")
        .cloned()
        .or_else(|| config.executor.artifact.clone());
    let artifact_path = match artifact_path {
        Some(path) => path,
        None => bail!("no executor artifact given, pass --artifact or set executor.artifact"),
    };
    let artifact = ContractArtifact::load(&artifact_path)?;

    let client = connect_client(
        &config.network.rpc_url,
        &config.network.private_key,
        config.network.chain_id,
    )
    .await?;
    let owner = match matches.get_one::<String>("owner") {
        Some(raw) => raw
            .parse::<Address>()
            .with_context(|| format!("Invalid owner address: {raw}"))?,
        None => client.signer().address(),
    };

    let (address, receipt) = convoy_core::deploy_executor(client, &artifact, owner).await?;
    println!("Executor deployed at {}", to_checksum(&address, None));
    println!("Deployment transaction: {:?}", receipt.transaction_hash);
    println!("Owner: {}", to_checksum(&owner, None));
    Ok(())
}

async fn approve(config: &Config, matches: &ArgMatches) -> Result<()> {
    let raw_hash = matches
        .get_one::<String>("bundle")
        .context("--bundle is required")?;
    let hash = raw_hash
        .parse::<H256>()
        .with_context(|| format!("Invalid bundle hash: {raw_hash}"))?;
    let executor_address = resolve_executor_address(config, matches)?;

    let executor = ExecutorContract::connect(
        &config.network.rpc_url,
        &config.network.private_key,
        config.network.chain_id,
        executor_address,
    )
    .await?;

    let receipt = executor.approve_bundle(hash).await?;
    println!(
        "Bundle {:?} approved in transaction {:?}",
        hash, receipt.transaction_hash
    );
    Ok(())
}

fn resolve_executor_address(config: &Config, matches: &ArgMatches) -> Result<Address> {
    let raw = matches
        .get_one::<String>("executor")
        .cloned()
        .or_else(|| config.executor.address.clone());
    let raw = match raw {
        Some(raw) => raw,
        None => bail!("no executor address given, pass --executor or set executor.address"),
    };
    raw.parse::<Address>()
        .with_context(|| format!("Invalid executor address: {raw}"))
}

fn print_plan(
    definition: &BundleDefinition,
    output: &BuildOutput,
    bundle: &TransactionBundle,
    executor: Address,
) {
    println!();
    println!("Bundle plan ({} steps):", definition.len());
    let mut creation = 0usize;
    for (index, step) in definition.steps.iter().enumerate() {
        match step {
            BundleStep::Deploy {
                contract,
                name,
                gas_limit,
                ..
            } => {
                let label = name.as_deref().unwrap_or(contract);
                let predicted = match output.predicted_deployments.get(creation) {
                    Some(address) => to_checksum(address, None),
                    None => String::new(),
                };
                creation += 1;
                println!("  {index:>2}. deploy {label:<24} -> {predicted}  (gas {gas_limit})");
            }
            BundleStep::Call {
                target,
                function,
                gas_limit,
                ..
            } => {
                println!("  {index:>2}. call   {target}.{function}  (gas {gas_limit})");
            }
        }
    }
    println!();
    println!("Executor:     {}", to_checksum(&executor, None));
    println!("Bundle hash:  {:?}", bundle.hash);
    println!("Transactions: {}", bundle.len());
    println!();
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleRecord<'a> {
    created_at: DateTime<Utc>,
    executor: String,
    bundle_hash: H256,
    transactions: &'a [CompiledTransaction],
}

fn write_bundle_record(path: &str, executor: Address, bundle: &TransactionBundle) -> Result<()> {
    let record = BundleRecord {
        created_at: Utc::now(),
        executor: to_checksum(&executor, None),
        bundle_hash: bundle.hash,
        transactions: &bundle.transactions,
    };
    let json = serde_json::to_string_pretty(&record).context("Failed to serialize the bundle")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {path}"))?;
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
