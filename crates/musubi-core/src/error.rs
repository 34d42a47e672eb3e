//! Error types for registration and execution.
//!
//! Registration-time defects surface as [`WorkflowError`] variants and are
//! meant to be fatal at startup. Per-execution failures are collected by the
//! engine into a single [`ExecutionFailure`].

use crate::id::{ActionId, WorkflowId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed error accepted as the source of a [`HandlerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Domain error returned by a handler's `invoke` or `compensate`.
///
/// # Examples
///
/// ```
/// use musubi_core::HandlerError;
///
/// let error = HandlerError::new("region not found");
/// assert_eq!(error.to_string(), "region not found");
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerError {
    /// Creates an error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_source("invalid payload", error)
    }
}

/// An alias could not be resolved because its source step has no recorded output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("alias '{alias}' references '{from}', which has not completed")]
pub struct ResolveError {
    /// The step the alias points at.
    pub from: ActionId,
    /// The alias being resolved.
    pub alias: String,
}

/// Why a single invoke or compensate call failed.
#[derive(Error, Debug)]
pub enum FailureCause {
    /// The handler returned an error.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The call did not finish within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The handler input could not be built.
    #[error(transparent)]
    Unresolved(#[from] ResolveError),
}

impl FailureCause {
    /// Returns `true` if the call exceeded its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailureCause::Timeout(_))
    }
}

/// A forward step that failed and stopped the workflow.
#[derive(Error, Debug)]
#[error("step '{action}' failed: {cause}")]
pub struct StepFailure {
    /// The step whose invocation failed.
    pub action: ActionId,
    /// What went wrong.
    pub cause: FailureCause,
}

/// A compensation that failed during unwind.
///
/// Recorded and reported, but never halts the unwind of earlier steps.
#[derive(Error, Debug)]
#[error("compensation of '{action}' failed: {cause}")]
pub struct CompensationFailure {
    /// The step whose rollback failed.
    pub action: ActionId,
    /// What went wrong.
    pub cause: FailureCause,
}

/// Composite failure returned to the caller when a workflow does not complete.
///
/// Carries the triggering [`StepFailure`], every [`CompensationFailure`]
/// observed while unwinding, and the steps that were rolled back.
#[derive(Error, Debug)]
#[error("workflow '{workflow}' failed: {origin}{}", CompensationSummary(.compensation_failures))]
pub struct ExecutionFailure {
    /// The workflow that failed.
    pub workflow: WorkflowId,
    /// The forward failure that triggered the unwind.
    pub origin: StepFailure,
    /// Rollbacks that did not succeed, in unwind order.
    pub compensation_failures: Vec<CompensationFailure>,
    /// Steps successfully compensated, in unwind order.
    pub compensated: Vec<ActionId>,
}

impl ExecutionFailure {
    /// Returns `true` if every attempted compensation succeeded.
    pub fn is_fully_compensated(&self) -> bool {
        self.compensation_failures.is_empty()
    }

    /// Returns the step whose failure triggered the unwind.
    pub fn failed_action(&self) -> &ActionId {
        &self.origin.action
    }
}

struct CompensationSummary<'a>(&'a [CompensationFailure]);

impl fmt::Display for CompensationSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, " ({} compensation(s) failed:", self.0.len())?;
        for failure in self.0 {
            write!(f, " {};", failure)?;
        }
        write!(f, ")")
    }
}

/// Errors that can occur while registering or running workflows.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use musubi_core::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::UnknownWorkflow(id) => format!("no workflow {}", id),
///         WorkflowError::Execution(failure) => format!("failed at {}", failure.failed_action()),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// No workflow is registered under this id.
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(WorkflowId),

    /// A workflow with this id is already registered.
    #[error("Workflow already registered: {0}")]
    DuplicateWorkflow(WorkflowId),

    /// A step reads from a step that is not guaranteed to have completed before it.
    #[error("Step '{action}' references '{from}' (alias '{alias}'), which does not precede it")]
    UnresolvedReference {
        /// The step declaring the reference.
        action: ActionId,
        /// The step being referenced.
        from: ActionId,
        /// The alias the reference binds.
        alias: String,
    },

    /// One input spec binds the same alias twice.
    #[error("Step '{action}' binds alias '{alias}' more than once")]
    DuplicateAlias {
        /// The step whose input spec collides.
        action: ActionId,
        /// The repeated alias.
        alias: String,
    },

    /// An action appears more than once in a step graph.
    #[error("Action declared more than once: {0}")]
    DuplicateAction(ActionId),

    /// A graph action has no handler binding.
    #[error("No handler bound for action: {0}")]
    MissingHandler(ActionId),

    /// An action was named that does not exist in the workflow's graph.
    #[error("Action not found in workflow: {0}")]
    UnknownAction(ActionId),

    /// The workflow configuration is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    /// A typed payload could not be converted to or from JSON.
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// An execution failed and was unwound.
    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
}

impl WorkflowError {
    /// Returns the composite execution failure, if this is one.
    pub fn as_execution(&self) -> Option<&ExecutionFailure> {
        match self {
            WorkflowError::Execution(failure) => Some(failure),
            _ => None,
        }
    }
}
