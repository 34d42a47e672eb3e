//! Orchestration engine: runs steps in order and unwinds on failure.

use musubi_core::{
    BoundStep, CompensationFailure, ExecutionContext, ExecutionFailure, FailureCause,
    HandlerError, StepFailure, StepState, WorkflowDefinition,
};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadlines applied to handler calls during one run.
///
/// When a binding also sets [`StepConfig::timeout`](musubi_core::StepConfig),
/// the shorter of the two deadlines applies. The default imposes a
/// 30 second deadline on every call even if the caller never asked for one;
/// use [`RunOptions::without_timeouts`] to lift it.
///
/// # Examples
///
/// ```
/// use musubi::RunOptions;
/// use std::time::Duration;
///
/// let options = RunOptions::default().with_step_timeout(Duration::from_secs(5));
/// assert_eq!(options.step_timeout, Some(Duration::from_secs(5)));
/// assert_eq!(options.compensation_timeout, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Deadline for each invoke call. `None` waits indefinitely.
    pub step_timeout: Option<Duration>,
    /// Deadline for each compensate call. `None` waits indefinitely.
    pub compensation_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step_timeout: Some(DEFAULT_TIMEOUT),
            compensation_timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl RunOptions {
    /// Sets the invoke deadline.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    /// Sets the compensate deadline.
    pub fn with_compensation_timeout(mut self, timeout: Duration) -> Self {
        self.compensation_timeout = Some(timeout);
        self
    }

    /// Disables both run-level deadlines.
    pub fn without_timeouts(mut self) -> Self {
        self.step_timeout = None;
        self.compensation_timeout = None;
        self
    }
}

/// Drives one [`WorkflowDefinition`] per call.
///
/// Steps run strictly one after another in the graph's execution order, and
/// compensations run strictly in reverse completion order. The engine holds
/// no per-execution state, so one instance can serve concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: RunOptions,
}

impl Engine {
    /// Creates an engine with the given deadlines.
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Returns the engine's deadlines.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs a workflow to completion, or unwinds it.
    ///
    /// On success every step has completed and the returned context holds
    /// every output. On failure, each completed step that is compensable has
    /// had its compensation attempted, most recent first.
    #[tracing::instrument(skip(self, definition, input), fields(workflow = %definition.id()))]
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> Result<ExecutionContext, ExecutionFailure> {
        let mut ctx = ExecutionContext::new(definition.id().clone(), input);

        for step in definition.steps() {
            let action = step.action();
            ctx.set_state(action, StepState::Running);

            match self.invoke(step, &ctx).await {
                Ok(output) => {
                    info!(action = %action, "step completed");
                    ctx.record_output(action.clone(), output);
                }
                Err(cause) => {
                    warn!(action = %action, error = %cause, "step failed, unwinding");
                    ctx.set_state(action, StepState::Failed);
                    let origin = StepFailure {
                        action: action.clone(),
                        cause,
                    };
                    return Err(self.unwind(definition, &mut ctx, origin).await);
                }
            }
        }

        info!(
            steps = ctx.completed().len(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "workflow completed"
        );
        Ok(ctx)
    }

    async fn invoke(&self, step: &BoundStep, ctx: &ExecutionContext) -> Result<Value, FailureCause> {
        let binding = step.binding();
        let input = binding.input().resolve(ctx)?;
        let deadline = tightest(binding.config().timeout, self.options.step_timeout);
        with_deadline(deadline, binding.invoker().invoke(input)).await
    }

    async fn unwind(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut ExecutionContext,
        origin: StepFailure,
    ) -> ExecutionFailure {
        let mut compensated = Vec::new();
        let mut compensation_failures = Vec::new();
        let completed: Vec<_> = ctx.completed().iter().rev().cloned().collect();

        for action in completed {
            let Some(step) = definition.step(action.as_str()) else {
                continue;
            };
            let compensator = match step.binding().compensator() {
                Some(compensator) if step.node().is_compensable() => compensator,
                _ => {
                    debug!(action = %action, "no compensation, skipping");
                    continue;
                }
            };

            ctx.set_state(&action, StepState::Compensating);
            let deadline = tightest(
                step.binding().config().timeout,
                self.options.compensation_timeout,
            );
            let result = match step.binding().compensation_input().resolve(ctx) {
                Ok(input) => with_deadline(deadline, compensator.compensate(input)).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(()) => {
                    info!(action = %action, "step compensated");
                    ctx.set_state(&action, StepState::Compensated);
                    compensated.push(action);
                }
                Err(cause) => {
                    // Keep unwinding: earlier steps are independent of this rollback.
                    warn!(action = %action, error = %cause, "compensation failed");
                    ctx.set_state(&action, StepState::CompensationFailed);
                    compensation_failures.push(CompensationFailure { action, cause });
                }
            }
        }

        ExecutionFailure {
            workflow: ctx.workflow_id().clone(),
            origin,
            compensation_failures,
            compensated,
        }
    }
}

fn tightest(binding: Option<Duration>, run: Option<Duration>) -> Option<Duration> {
    match (binding, run) {
        (Some(binding), Some(run)) => Some(binding.min(run)),
        (binding, run) => binding.or(run),
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    call: impl Future<Output = Result<T, HandlerError>>,
) -> Result<T, FailureCause> {
    match deadline {
        Some(limit) => match timeout(limit, call).await {
            Ok(result) => result.map_err(FailureCause::from),
            Err(_) => Err(FailureCause::Timeout(limit)),
        },
        None => call.await.map_err(FailureCause::from),
    }
}
