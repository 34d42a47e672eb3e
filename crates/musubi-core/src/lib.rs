//! Core types for the musubi saga engine.
//!
//! This crate has no async runtime dependency. It describes workflows and
//! resolves their data flow; running them is the job of the `musubi` crate.
//!
//! # Core Types
//!
//! - [`StepGraph`] - Validated, acyclic graph of steps built from [`StepDefinition`]s
//! - [`AliasRef`] / [`InputSpec`] - Declarative data flow between steps
//! - [`Invoke`] / [`Compensate`] - Handler contracts implemented by collaborators
//! - [`HandlerBinding`] - Handlers plus input specs for one action
//! - [`WorkflowDefinition`] - Graph and bindings, checked for wiring defects
//! - [`ExecutionContext`] - Per-execution outputs, completion order and step states
//! - [`WorkflowError`] / [`ExecutionFailure`] - Error taxonomy

mod alias;
mod context;
mod definition;
mod error;
mod handler;
mod id;
mod step;

pub use alias::{AliasRef, InputSpec, Source, INPUT_SOURCE};
pub use context::{ExecutionContext, StepState};
pub use definition::{BoundStep, WorkflowDefinition};
pub use error::{
    BoxError, CompensationFailure, ExecutionFailure, FailureCause, HandlerError, ResolveError,
    StepFailure, WorkflowError,
};
pub use handler::{
    compensate_fn, invoke_fn, Compensate, CompensateFn, HandlerBinding, Invoke, InvokeFn,
    StepConfig,
};
pub use id::{ActionId, WorkflowId};
pub use step::{Next, StepDefinition, StepGraph, StepNode};
