//! Per-execution state: outputs by action, completion order and step states.

use crate::id::{ActionId, WorkflowId};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of one step within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepState {
    /// Not started yet.
    #[default]
    Pending,
    /// Invocation in progress.
    Running,
    /// Invocation succeeded and its output is recorded.
    Completed,
    /// Invocation failed.
    Failed,
    /// Rollback in progress.
    Compensating,
    /// Rollback succeeded.
    Compensated,
    /// Rollback failed.
    CompensationFailed,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepState::Pending => "pending",
            StepState::Running => "running",
            StepState::Completed => "completed",
            StepState::Failed => "failed",
            StepState::Compensating => "compensating",
            StepState::Compensated => "compensated",
            StepState::CompensationFailed => "compensation_failed",
        };
        write!(f, "{}", name)
    }
}

/// State owned by a single workflow execution.
///
/// Created fresh for every run and dropped when the run returns; nothing is
/// shared between executions.
///
/// # Examples
///
/// ```
/// use musubi_core::{ActionId, ExecutionContext, StepState, WorkflowId};
/// use serde_json::json;
///
/// let mut ctx = ExecutionContext::new(WorkflowId::new("create-cart"), json!({ "email": "a@b.c" }));
/// ctx.record_output(ActionId::new("findRegion"), json!({ "id": "reg_01" }));
///
/// assert_eq!(ctx.output("findRegion"), Some(&json!({ "id": "reg_01" })));
/// assert_eq!(ctx.state("findRegion"), StepState::Completed);
/// assert_eq!(ctx.state("createCart"), StepState::Pending);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    workflow: WorkflowId,
    input: Value,
    outputs: HashMap<ActionId, Value>,
    completed: Vec<ActionId>,
    states: HashMap<ActionId, StepState>,
    started_at: Instant,
}

impl ExecutionContext {
    /// Creates a context holding the caller's input.
    pub fn new(workflow: WorkflowId, input: Value) -> Self {
        Self {
            workflow,
            input,
            outputs: HashMap::new(),
            completed: Vec::new(),
            states: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Returns the workflow being executed.
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow
    }

    /// Returns the original workflow input.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Returns the recorded output of a completed step.
    pub fn output(&self, action: &str) -> Option<&Value> {
        self.outputs.get(action)
    }

    /// Removes and returns the recorded output of a step.
    pub fn take_output(&mut self, action: &str) -> Option<Value> {
        self.outputs.remove(action)
    }

    /// Records a step's output and marks it completed.
    pub fn record_output(&mut self, action: ActionId, output: Value) {
        self.states.insert(action.clone(), StepState::Completed);
        self.completed.push(action.clone());
        self.outputs.insert(action, output);
    }

    /// Returns the completed steps, oldest first.
    pub fn completed(&self) -> &[ActionId] {
        &self.completed
    }

    /// Returns the current state of a step.
    pub fn state(&self, action: &str) -> StepState {
        self.states.get(action).copied().unwrap_or_default()
    }

    /// Moves a step to a new state.
    pub fn set_state(&mut self, action: &ActionId, state: StepState) {
        self.states.insert(action.clone(), state);
    }

    /// Returns the time elapsed since the execution started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_order() {
        let mut ctx = ExecutionContext::new(WorkflowId::new("wf"), json!({}));
        ctx.record_output(ActionId::new("a"), json!(1));
        ctx.record_output(ActionId::new("b"), json!(2));
        ctx.record_output(ActionId::new("c"), json!(3));

        let order: Vec<&str> = ctx.completed().iter().map(ActionId::as_str).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(ctx.output("b"), Some(&json!(2)));
    }

    #[test]
    fn test_state_transitions() {
        let mut ctx = ExecutionContext::new(WorkflowId::new("wf"), json!({}));
        let action = ActionId::new("createCart");
        assert_eq!(ctx.state("createCart"), StepState::Pending);

        ctx.set_state(&action, StepState::Running);
        assert_eq!(ctx.state("createCart"), StepState::Running);

        ctx.record_output(action.clone(), json!({ "id": "cart_01" }));
        ctx.set_state(&action, StepState::Compensated);
        assert_eq!(ctx.state("createCart"), StepState::Compensated);
        assert_eq!(ctx.state("createCart").to_string(), "compensated");
    }

    #[test]
    fn test_take_output() {
        let mut ctx = ExecutionContext::new(WorkflowId::new("wf"), json!({}));
        ctx.record_output(ActionId::new("createCart"), json!({ "id": "cart_01" }));

        assert_eq!(ctx.take_output("createCart"), Some(json!({ "id": "cart_01" })));
        assert_eq!(ctx.output("createCart"), None);
    }

    #[test]
    fn test_elapsed() {
        let ctx = ExecutionContext::new(WorkflowId::new("wf"), json!(null));
        std::thread::sleep(Duration::from_millis(10));
        assert!(ctx.elapsed() >= Duration::from_millis(10));
    }
}
