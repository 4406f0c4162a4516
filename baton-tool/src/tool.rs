//! Tool traits: the typed [`Tool`] and the type-erased [`ToolDyn`].

use baton_types::{RunContext, ToolSpec, from_value, schema_for};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future used at the object-safe boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from tool execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments did not match the tool's argument shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The tool ran and failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The tool asks the model to try again with the given guidance.
    #[error("model retry requested: {0}")]
    ModelRetry(String),
}

impl ToolError {
    /// Wrap any error as an execution failure.
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ToolError::ExecutionFailed(err.into())
    }
}

/// Strongly-typed tool. Implement this for your tools.
///
/// The blanket impl of [`ToolDyn`] deserializes arguments into
/// [`Tool::Args`] and serializes [`Tool::Output`] back to text, so you work
/// with concrete Rust types.
///
/// # Example
///
/// ```ignore
/// use baton_tool::*;
///
/// #[derive(serde::Deserialize, schemars::JsonSchema)]
/// struct WeatherArgs { city: String }
///
/// struct Weather;
/// impl Tool<()> for Weather {
///     type Args = WeatherArgs;
///     type Output = String;
///     type Error = ToolError;
///
///     fn name(&self) -> &str { "get_weather" }
///     fn description(&self) -> &str { "Current weather for a city" }
///     fn call(&self, args: WeatherArgs, _ctx: &RunContext<()>)
///         -> impl Future<Output = Result<String, ToolError>> + Send
///     { async move { Ok(format!("sunny in {}", args.city)) } }
/// }
/// ```
pub trait Tool<C>: Send + Sync {
    /// The deserialized argument type.
    type Args: DeserializeOwned + JsonSchema + Send;
    /// The serializable output type.
    type Output: Serialize;
    /// The tool-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Name the model calls. Unique within an agent's tool set.
    fn name(&self) -> &str;

    /// Human-readable description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments. Derived from [`Tool::Args`] by default.
    fn parameters(&self) -> serde_json::Value {
        schema_for::<Self::Args>()
    }

    /// Execute the tool with typed arguments.
    fn call(
        &self,
        args: Self::Args,
        ctx: &RunContext<C>,
    ) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;
}

/// Type-erased tool for dynamic dispatch. Blanket-implemented for all [`Tool`] impls.
pub trait ToolDyn<C>: Send + Sync {
    /// The tool's unique name.
    fn name(&self) -> &str;

    /// Declaration sent to the model.
    fn spec(&self) -> ToolSpec;

    /// Execute with parsed JSON arguments, returning the output text.
    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a RunContext<C>,
    ) -> BoxFuture<'a, Result<String, ToolError>>;
}

impl<C, T> ToolDyn<C> for T
where
    C: Send + Sync,
    T: Tool<C>,
{
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Tool::name(self).to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    fn call_dyn<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: &'a RunContext<C>,
    ) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let args: T::Args =
                from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

            let output = self.call(args, ctx).await.map_err(into_tool_error)?;

            let structured = serde_json::to_value(&output).map_err(ToolError::failed)?;
            Ok(match structured {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
        })
    }
}

/// Tools may fail with a [`ToolError`] directly; keep its variant intact.
fn into_tool_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> ToolError {
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
    match boxed.downcast::<ToolError>() {
        Ok(tool_error) => *tool_error,
        Err(other) => ToolError::ExecutionFailed(other),
    }
}

/// A tool backed by an async closure.
///
/// Created with [`function_tool`].
pub struct FunctionTool<C, A, F> {
    name: String,
    description: String,
    func: F,
    _marker: PhantomData<fn(C, A)>,
}

/// Build a tool from an async closure taking the run context and typed arguments.
///
/// ```ignore
/// let add = function_tool("add", "Add two numbers", |_ctx, args: AddArgs| async move {
///     Ok::<_, ToolError>(args.a + args.b)
/// });
/// ```
pub fn function_tool<C, A, O, E, F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    func: F,
) -> FunctionTool<C, A, F>
where
    A: DeserializeOwned + JsonSchema + Send,
    O: Serialize,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(RunContext<C>, A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, E>> + Send,
{
    FunctionTool {
        name: name.into(),
        description: description.into(),
        func,
        _marker: PhantomData,
    }
}

impl<C, A, O, E, F, Fut> Tool<C> for FunctionTool<C, A, F>
where
    A: DeserializeOwned + JsonSchema + Send,
    O: Serialize,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(RunContext<C>, A) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, E>> + Send,
{
    type Args = A;
    type Output = O;
    type Error = E;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn call(
        &self,
        args: A,
        ctx: &RunContext<C>,
    ) -> impl Future<Output = Result<O, E>> + Send {
        (self.func)(ctx.clone(), args)
    }
}
