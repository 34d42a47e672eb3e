//! Entry point for callers: run a registered workflow by id.

use crate::engine::{Engine, RunOptions};
use crate::registry::{self, Registry};
use musubi_core::{ActionId, ExecutionContext, WorkflowError, WorkflowId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Runs registered workflows.
///
/// Cheap to clone; clones share the same read-only [`Registry`]. Every call
/// gets its own [`ExecutionContext`], so concurrent runs never observe each
/// other's data.
///
/// # Examples
///
/// ```
/// use musubi::prelude::*;
/// use serde_json::{json, Value};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), WorkflowError> {
/// let mut registry = Registry::new();
/// registry.register(
///     "greet",
///     StepGraph::new([StepDefinition::new("hello")])?,
///     [(
///         "hello",
///         HandlerBinding::new(invoke_fn(|input: Value| async move {
///             let name = input["name"].as_str().unwrap_or("stranger");
///             Ok::<_, HandlerError>(json!({ "greeting": format!("hello {}", name) }))
///         }))
///         .with_input([AliasRef::input("name").field("name")]),
///     )],
/// )?;
///
/// let workflows = Workflows::new(Arc::new(registry));
/// let output = workflows.run("greet", json!({ "name": "Alice" })).await?;
/// assert_eq!(output, json!({ "greeting": "hello Alice" }));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Workflows {
    registry: Arc<Registry>,
    engine: Engine,
}

impl Workflows {
    /// Creates a facade over a populated registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            engine: Engine::default(),
        }
    }

    /// Creates a facade over the process-wide registry.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Configuration`] if no registry was installed.
    pub fn global() -> Result<Self, WorkflowError> {
        registry::global().map(Self::new).ok_or_else(|| {
            WorkflowError::Configuration("no global registry installed".to_string())
        })
    }

    /// Replaces the run-level deadlines.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.engine = Engine::new(options);
        self
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs a workflow and returns its terminal step's output.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::UnknownWorkflow`] if `id` is not registered
    /// - [`WorkflowError::Execution`] if a step failed; completed steps have
    ///   been compensated where possible
    pub async fn run(&self, id: &str, input: Value) -> Result<Value, WorkflowError> {
        let definition = self.registry.resolve(id)?;
        let terminal = definition
            .terminal()
            .cloned()
            .ok_or_else(|| WorkflowError::Configuration(format!("workflow '{}' has no steps", id)))?;
        self.run_until(id, &terminal, input).await
    }

    /// Runs a workflow and returns the full execution context.
    pub async fn execute(&self, id: &str, input: Value) -> Result<ExecutionContext, WorkflowError> {
        let definition = self.registry.resolve(id)?;
        Ok(self.engine.execute(definition, input).await?)
    }

    /// Binds a workflow to the step whose output is its result.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::UnknownWorkflow`] if `id` is not registered
    /// - [`WorkflowError::UnknownAction`] if the workflow has no such step
    pub fn export(
        &self,
        id: impl Into<WorkflowId>,
        result_from: impl Into<ActionId>,
    ) -> Result<ExportedWorkflow, WorkflowError> {
        let id = id.into();
        let result_from = result_from.into();
        let definition = self.registry.resolve(id.as_str())?;
        if definition.step(result_from.as_str()).is_none() {
            return Err(WorkflowError::UnknownAction(result_from));
        }
        Ok(ExportedWorkflow {
            workflows: self.clone(),
            id,
            result_from,
        })
    }

    async fn run_until(
        &self,
        id: &str,
        result_from: &ActionId,
        input: Value,
    ) -> Result<Value, WorkflowError> {
        let mut ctx = self.execute(id, input).await?;
        ctx.take_output(result_from.as_str())
            .ok_or_else(|| WorkflowError::UnknownAction(result_from.clone()))
    }
}

/// A workflow bound to a designated result step.
///
/// Obtained from [`Workflows::export`].
#[derive(Debug, Clone)]
pub struct ExportedWorkflow {
    workflows: Workflows,
    id: WorkflowId,
    result_from: ActionId,
}

impl ExportedWorkflow {
    /// Returns the workflow id.
    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    /// Returns the step whose output is returned.
    pub fn result_from(&self) -> &ActionId {
        &self.result_from
    }

    /// Runs the workflow and returns the result step's output.
    pub async fn run(&self, input: Value) -> Result<Value, WorkflowError> {
        self.workflows
            .run_until(self.id.as_str(), &self.result_from, input)
            .await
    }

    /// Runs the workflow with typed input and output.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::Payload`] if either side does not convert, plus
    /// everything [`ExportedWorkflow::run`] returns.
    pub async fn call<I, O>(&self, input: &I) -> Result<O, WorkflowError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let output = self.run(input).await?;
        Ok(serde_json::from_value(output)?)
    }
}
