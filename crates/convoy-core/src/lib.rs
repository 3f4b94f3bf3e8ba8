//! Convoy Core - bundle construction and execution for the transaction executor

pub mod approval;
pub mod artifact;
pub mod builder;
pub mod bundle;
pub mod definition;
pub mod error;
pub mod executor;
pub mod placeholder;
pub mod registry;
pub mod runner;
pub mod tokens;

pub use approval::{ApprovalError, ApprovalGate, GateConfig};
pub use artifact::{ArtifactStore, ContractArtifact};
pub use builder::{build_raw_transactions, plan_bundle, BuildOutput, BundlePlan, RawTransaction};
pub use bundle::{CompiledTransaction, TransactionBundle};
pub use definition::{BundleDefinition, BundleStep, DefinitionError};
pub use error::{BuildError, StepError};
pub use executor::{
    connect_client, deploy_executor, ExecutorClient, ExecutorContract, ExecutorMiddleware,
    EXECUTOR_ABI,
};
pub use placeholder::{resolve_argument, resolve_arguments, Placeholder};
pub use registry::{ContractRegistry, RegisteredContract};
pub use runner::{
    BundleRunner, ExecuteError, ExecutionReport, RunnerConfig, DEFAULT_GAS_MARGIN,
};
pub use tokens::coerce_arguments;
