//! Workflow registry: populated once at startup, read-only afterwards.

use musubi_core::{ActionId, HandlerBinding, StepGraph, WorkflowDefinition, WorkflowError, WorkflowId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Table of registered workflows.
///
/// Registration takes `&mut self`, so it is serialized by ownership. Once
/// populated, share the registry behind an [`Arc`] (or [`install`] it as the
/// process-wide instance); lookups then need no locking.
///
/// # Examples
///
/// ```
/// use musubi::prelude::*;
/// use serde_json::Value;
///
/// let mut registry = Registry::new();
/// registry.register(
///     "ping",
///     StepGraph::new([StepDefinition::new("pong")])?,
///     [("pong", HandlerBinding::new(invoke_fn(|input: Value| async move {
///         Ok::<_, HandlerError>(input)
///     })))],
/// )?;
///
/// assert!(registry.contains("ping"));
/// assert!(matches!(registry.resolve("missing"), Err(WorkflowError::UnknownWorkflow(_))));
/// # Ok::<(), WorkflowError>(())
/// ```
#[derive(Default)]
pub struct Registry {
    workflows: HashMap<WorkflowId, WorkflowDefinition>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            workflows: HashMap::new(),
        }
    }

    /// Validates and registers a workflow.
    ///
    /// On error the registry is left unchanged; an existing registration
    /// under the same id stays active.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::DuplicateWorkflow`] if the id is taken, or any
    /// validation error from [`WorkflowDefinition::new`].
    pub fn register<A>(
        &mut self,
        id: impl Into<WorkflowId>,
        graph: StepGraph,
        handlers: impl IntoIterator<Item = (A, HandlerBinding)>,
    ) -> Result<&mut Self, WorkflowError>
    where
        A: Into<ActionId>,
    {
        let id = id.into();
        if self.workflows.contains_key(&id) {
            return Err(WorkflowError::DuplicateWorkflow(id));
        }
        let definition = WorkflowDefinition::new(id, graph, handlers)?;
        self.insert(definition)
    }

    /// Registers an already validated definition.
    pub fn insert(&mut self, definition: WorkflowDefinition) -> Result<&mut Self, WorkflowError> {
        if self.workflows.contains_key(definition.id()) {
            return Err(WorkflowError::DuplicateWorkflow(definition.id().clone()));
        }
        info!(
            workflow = %definition.id(),
            steps = definition.steps().len(),
            "workflow registered"
        );
        self.workflows.insert(definition.id().clone(), definition);
        Ok(self)
    }

    /// Looks up a workflow.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::UnknownWorkflow`] if nothing is registered under `id`.
    pub fn resolve(&self, id: &str) -> Result<&WorkflowDefinition, WorkflowError> {
        self.workflows
            .get(id)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(WorkflowId::new(id)))
    }

    /// Returns `true` if a workflow is registered under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.workflows.contains_key(id)
    }

    /// Returns an iterator over the registered ids.
    pub fn ids(&self) -> impl Iterator<Item = &WorkflowId> {
        self.workflows.keys()
    }

    /// Returns the number of registered workflows.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Installs the process-wide registry. Succeeds at most once per process.
///
/// # Errors
///
/// [`WorkflowError::Configuration`] if a registry is already installed.
pub fn install(registry: Registry) -> Result<Arc<Registry>, WorkflowError> {
    GLOBAL
        .set(Arc::new(registry))
        .map_err(|_| WorkflowError::Configuration("a global registry is already installed".to_string()))?;
    info!("global workflow registry installed");
    global().ok_or_else(|| WorkflowError::Configuration("global registry unavailable".to_string()))
}

/// Returns the process-wide registry, if one was installed.
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}
