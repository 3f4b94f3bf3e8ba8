//! Build-time error types
//!
//! Everything in this module is raised while a bundle is being assembled,
//! before any transaction leaves the process. Execution-side failures live
//! next to the code that produces them (`approval`, `runner`).

use thiserror::Error;

/// A failure while turning a bundle definition into raw transactions.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A string argument started with `{` but did not parse as a placeholder
    #[error("Malformed placeholder {0:?}, expected \"{{stepName}}.field\"")]
    MalformedPlaceholder(String),

    /// A placeholder named a step that has not been registered yet
    #[error("Reference to unknown step {0:?}")]
    UnresolvedReference(String),

    /// A placeholder asked for a field the registry does not expose
    #[error("Step {step:?} has no field {field:?}")]
    UnknownField { step: String, field: String },

    /// A call step targeted a name with no registered deployment
    #[error("Call target {0:?} is not a deployed bundle contract")]
    UnknownTarget(String),

    /// No compiler artifact was found for the named contract
    #[error("No artifact found for contract {0:?}")]
    MissingArtifact(String),

    /// The target contract's ABI does not declare the requested function
    #[error("Contract {contract:?} has no function {function:?}")]
    UnknownFunction { contract: String, function: String },

    /// Constructor arguments were supplied for a contract without one
    #[error("Contract {0:?} has no constructor but {1} arguments were given")]
    UnexpectedConstructorArguments(String, usize),

    /// Argument list length does not match the ABI parameter list
    #[error("Expected {expected} arguments, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// A single argument could not be coerced to its ABI parameter type
    #[error("Argument {position}: {reason}")]
    ArgumentMismatch { position: usize, reason: String },

    /// Two steps tried to register the same name
    #[error("Step name {0:?} is already taken")]
    DuplicateName(String),

    #[error("ABI encoding failed: {0}")]
    AbiEncode(#[from] ethers::abi::Error),
}

/// A [`BuildError`] annotated with the step that produced it.
///
/// The index is the 0-based position in the bundle definition; the name is
/// the step's registry name, so definition authors can find the offending
/// entry without counting.
#[derive(Debug, Error)]
#[error("Step {index} ({step}): {source}")]
pub struct StepError {
    pub index: usize,
    pub step: String,
    #[source]
    pub source: BuildError,
}

impl StepError {
    pub fn new(index: usize, step: impl Into<String>, source: BuildError) -> Self {
        Self {
            index,
            step: step.into(),
            source,
        }
    }
}
