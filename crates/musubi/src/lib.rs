//! An in-process saga orchestrator.
//!
//! A workflow is a graph of steps. Each step's handler receives inputs
//! aliased from the workflow input and from earlier steps' outputs. If any
//! step fails, the steps that already completed are compensated in reverse
//! order, and the caller receives one composite failure.
//!
//! # Example
//!
//! ```rust
//! use musubi::prelude::*;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WorkflowError> {
//! let graph = StepGraph::new([StepDefinition::new("findRegion")
//!     .no_compensation()
//!     .then(StepDefinition::new("createCart"))])?;
//!
//! let find_region = HandlerBinding::new(invoke_fn(|input: Value| async move {
//!     Ok::<_, HandlerError>(json!({ "id": input["region_id"] }))
//! }))
//! .with_input([AliasRef::input("region_id").field("region_id")]);
//!
//! let create_cart = HandlerBinding::new(invoke_fn(|input: Value| async move {
//!     Ok::<_, HandlerError>(json!({ "id": "cart_01", "region_id": input["region"]["id"] }))
//! }))
//! .with_input([AliasRef::action("findRegion", "region")])
//! .with_compensation(compensate_fn(|_input: Value| async move { Ok::<_, HandlerError>(()) }));
//!
//! let mut registry = Registry::new();
//! registry.register(
//!     "create-cart",
//!     graph,
//!     [("findRegion", find_region), ("createCart", create_cart)],
//! )?;
//!
//! let workflows = Workflows::new(Arc::new(registry));
//! let cart = workflows
//!     .export("create-cart", "createCart")?
//!     .run(json!({ "region_id": "reg_01" }))
//!     .await?;
//!
//! assert_eq!(cart, json!({ "id": "cart_01", "region_id": "reg_01" }));
//! # Ok(())
//! # }
//! ```

mod engine;
mod facade;
pub mod registry;
mod retry;

// Re-export core types
pub use musubi_core::*;

pub use engine::{Engine, RunOptions};
pub use facade::{ExportedWorkflow, Workflows};
pub use registry::Registry;
pub use retry::{RetryPolicy, Retrying};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        compensate_fn, invoke_fn, ActionId, AliasRef, Compensate, Engine, ExecutionContext,
        ExecutionFailure, ExportedWorkflow, FailureCause, HandlerBinding, HandlerError,
        InputSpec, Invoke, Registry, RetryPolicy, Retrying, RunOptions, StepConfig,
        StepDefinition, StepGraph, StepState, WorkflowError, WorkflowId, Workflows,
    };
}
