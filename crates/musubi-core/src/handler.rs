//! Handler contracts and the bindings that attach them to actions.

use crate::alias::InputSpec;
use crate::error::HandlerError;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The forward action of a step.
///
/// Receives the resolved input object and returns the step's output.
/// Implementations must be stateless with respect to a single execution:
/// one instance serves every concurrent run of its workflow.
///
/// # Examples
///
/// ```
/// use musubi_core::{HandlerError, Invoke};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct FindRegion;
///
/// #[async_trait]
/// impl Invoke for FindRegion {
///     async fn invoke(&self, input: Value) -> Result<Value, HandlerError> {
///         let id = input["cart"]["region_id"]
///             .as_str()
///             .ok_or_else(|| HandlerError::new("region_id is required"))?;
///         Ok(json!({ "id": id }))
///     }
/// }
/// ```
#[async_trait]
pub trait Invoke: Send + Sync {
    /// Performs the step's work.
    async fn invoke(&self, input: Value) -> Result<Value, HandlerError>;
}

/// The compensating action of a step.
///
/// Undoes a previously successful [`Invoke`]. May be called again after a
/// partial rollback, so it should tolerate already-undone effects.
#[async_trait]
pub trait Compensate: Send + Sync {
    /// Undoes the step's effect.
    async fn compensate(&self, input: Value) -> Result<(), HandlerError>;
}

/// [`Invoke`] implemented by an async closure. See [`invoke_fn`].
pub struct InvokeFn<F>(F);

/// Wraps an async closure as an [`Invoke`] handler.
///
/// ```
/// use musubi_core::{invoke_fn, HandlerError};
/// use serde_json::{json, Value};
///
/// let handler = invoke_fn(|input: Value| async move {
///     Ok::<_, HandlerError>(json!({ "echo": input }))
/// });
/// # let _ = handler;
/// ```
pub fn invoke_fn<F, Fut>(f: F) -> InvokeFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    InvokeFn(f)
}

#[async_trait]
impl<F, Fut> Invoke for InvokeFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn invoke(&self, input: Value) -> Result<Value, HandlerError> {
        (self.0)(input).await
    }
}

/// [`Compensate`] implemented by an async closure. See [`compensate_fn`].
pub struct CompensateFn<F>(F);

/// Wraps an async closure as a [`Compensate`] handler.
pub fn compensate_fn<F, Fut>(f: F) -> CompensateFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    CompensateFn(f)
}

#[async_trait]
impl<F, Fut> Compensate for CompensateFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn compensate(&self, input: Value) -> Result<(), HandlerError> {
        (self.0)(input).await
    }
}

/// Per-binding execution settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepConfig {
    /// Deadline for each invoke or compensate call of this step. It can only
    /// shorten the run-level timeout; `None` leaves the run-level one alone.
    pub timeout: Option<Duration>,
}

/// Pairs an action with its handlers and input specs.
///
/// A binding without a compensate handler is never rolled back, whether or
/// not its step is marked `noCompensation`.
///
/// # Examples
///
/// ```
/// use musubi_core::{compensate_fn, invoke_fn, AliasRef, HandlerBinding, HandlerError};
/// use serde_json::{json, Value};
///
/// let create_cart = HandlerBinding::new(invoke_fn(|input: Value| async move {
///     Ok::<_, HandlerError>(json!({ "id": "cart_01", "region": input["region"] }))
/// }))
/// .with_input([AliasRef::action("findRegion", "region")])
/// .with_compensation(compensate_fn(|_input: Value| async move { Ok::<_, HandlerError>(()) }))
/// .with_compensation_input([AliasRef::action("createCart", "cart")]);
///
/// assert!(create_cart.is_compensable());
/// ```
#[derive(Clone)]
pub struct HandlerBinding {
    invoke: Arc<dyn Invoke>,
    compensate: Option<Arc<dyn Compensate>>,
    input: InputSpec,
    compensation_input: Option<InputSpec>,
    config: StepConfig,
}

impl fmt::Debug for HandlerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBinding")
            .field("input", &self.input)
            .field("compensable", &self.is_compensable())
            .field("compensation_input", &self.compensation_input)
            .field("config", &self.config)
            .finish()
    }
}

impl HandlerBinding {
    /// Creates a binding with an empty input spec and no compensation.
    pub fn new(invoke: impl Invoke + 'static) -> Self {
        Self {
            invoke: Arc::new(invoke),
            compensate: None,
            input: InputSpec::default(),
            compensation_input: None,
            config: StepConfig::default(),
        }
    }

    /// Sets the invoke input spec.
    pub fn with_input(mut self, input: impl Into<InputSpec>) -> Self {
        self.input = input.into();
        self
    }

    /// Attaches a compensate handler.
    pub fn with_compensation(mut self, compensate: impl Compensate + 'static) -> Self {
        self.compensate = Some(Arc::new(compensate));
        self
    }

    /// Sets a separate input spec for compensation. It may reference the
    /// step's own output.
    pub fn with_compensation_input(mut self, input: impl Into<InputSpec>) -> Self {
        self.compensation_input = Some(input.into());
        self
    }

    /// Sets a per-call timeout for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Replaces the step configuration.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the invoke handler.
    pub fn invoker(&self) -> &dyn Invoke {
        self.invoke.as_ref()
    }

    /// Returns the compensate handler, if any.
    pub fn compensator(&self) -> Option<&dyn Compensate> {
        self.compensate.as_deref()
    }

    /// Returns `true` if a compensate handler is attached.
    pub fn is_compensable(&self) -> bool {
        self.compensate.is_some()
    }

    /// Returns the invoke input spec.
    pub fn input(&self) -> &InputSpec {
        &self.input
    }

    /// Returns the compensation input spec, falling back to the invoke spec.
    pub fn compensation_input(&self) -> &InputSpec {
        self.compensation_input.as_ref().unwrap_or(&self.input)
    }

    /// Returns `true` if compensation has its own input spec.
    pub fn has_compensation_input(&self) -> bool {
        self.compensation_input.is_some()
    }

    /// Returns the step configuration.
    pub fn config(&self) -> &StepConfig {
        &self.config
    }
}
