//! Input and output guardrails with tripwire support.
//!
//! Guardrails check input before it reaches the model and output before it
//! reaches the caller. Each check reports a [`GuardrailFunctionOutput`]; a
//! triggered tripwire halts the run. A check that itself fails is reported
//! as [`GuardrailFailure::Execution`], distinct from a tripwire.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use baton_types::{RunContext, RunItem};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of a single guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailFunctionOutput {
    /// Whether the run must stop.
    pub tripwire_triggered: bool,
    /// Diagnostic payload for the caller.
    pub output_info: serde_json::Value,
}

impl GuardrailFunctionOutput {
    /// A passing check with no diagnostics.
    pub fn pass() -> Self {
        Self {
            tripwire_triggered: false,
            output_info: serde_json::Value::Null,
        }
    }

    /// A passing check with diagnostics.
    pub fn pass_with(output_info: serde_json::Value) -> Self {
        Self {
            tripwire_triggered: false,
            output_info,
        }
    }

    /// A tripped check.
    pub fn tripwire(output_info: serde_json::Value) -> Self {
        Self {
            tripwire_triggered: true,
            output_info,
        }
    }
}

/// A guardrail check that could not run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// The check failed with a message.
    #[error("guardrail check failed: {0}")]
    CheckFailed(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of one named guardrail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    /// Guardrail name.
    pub guardrail: String,
    /// Agent the guardrail ran for.
    pub agent: String,
    /// What the check reported.
    pub output: GuardrailFunctionOutput,
}

/// Why a guardrail set stopped the run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GuardrailFailure {
    /// A check worked and tripped.
    #[error("guardrail `{}` tripwire triggered", .0.guardrail)]
    Tripwire(GuardrailResult),

    /// A check could not run.
    #[error("guardrail `{guardrail}` failed to run: {source}")]
    Execution {
        /// Guardrail name.
        guardrail: String,
        /// The underlying failure.
        #[source]
        source: GuardrailError,
    },
}

type CheckFuture<'a> =
    Pin<Box<dyn Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send + 'a>>;

/// Check run over the input of a fresh run.
///
/// # Example
///
/// ```ignore
/// struct NoSecrets;
/// impl InputCheck<()> for NoSecrets {
///     fn check(&self, _ctx: &RunContext<()>, _agent: &str, input: &[RunItem])
///         -> impl Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send
///     {
///         let leaked = input.iter().filter_map(RunItem::text).any(|t| t.contains("API_KEY"));
///         async move {
///             Ok(if leaked {
///                 GuardrailFunctionOutput::tripwire(json!("input contains an API key"))
///             } else {
///                 GuardrailFunctionOutput::pass()
///             })
///         }
///     }
/// }
/// ```
pub trait InputCheck<C>: Send + Sync {
    /// Inspect the run input.
    fn check(
        &self,
        ctx: &RunContext<C>,
        agent: &str,
        input: &[RunItem],
    ) -> impl Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send;
}

/// Check run over a candidate final output.
pub trait OutputCheck<C>: Send + Sync {
    /// Inspect the candidate output.
    fn check(
        &self,
        ctx: &RunContext<C>,
        agent: &str,
        output: &serde_json::Value,
    ) -> impl Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send;
}

/// Object-safe wrapper around [`InputCheck`].
pub trait ErasedInputCheck<C>: Send + Sync {
    /// Type-erased check.
    fn check_dyn<'a>(
        &'a self,
        ctx: &'a RunContext<C>,
        agent: &'a str,
        input: &'a [RunItem],
    ) -> CheckFuture<'a>;
}

impl<C: Send + Sync, T: InputCheck<C>> ErasedInputCheck<C> for T {
    fn check_dyn<'a>(
        &'a self,
        ctx: &'a RunContext<C>,
        agent: &'a str,
        input: &'a [RunItem],
    ) -> CheckFuture<'a> {
        Box::pin(self.check(ctx, agent, input))
    }
}

/// Object-safe wrapper around [`OutputCheck`].
pub trait ErasedOutputCheck<C>: Send + Sync {
    /// Type-erased check.
    fn check_dyn<'a>(
        &'a self,
        ctx: &'a RunContext<C>,
        agent: &'a str,
        output: &'a serde_json::Value,
    ) -> CheckFuture<'a>;
}

impl<C: Send + Sync, T: OutputCheck<C>> ErasedOutputCheck<C> for T {
    fn check_dyn<'a>(
        &'a self,
        ctx: &'a RunContext<C>,
        agent: &'a str,
        output: &'a serde_json::Value,
    ) -> CheckFuture<'a> {
        Box::pin(self.check(ctx, agent, output))
    }
}

/// Adapts an async closure over owned arguments into a check.
pub struct CheckFn<F>(F);

impl<C, F, Fut> InputCheck<C> for CheckFn<F>
where
    F: Fn(RunContext<C>, Vec<RunItem>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send,
{
    fn check(
        &self,
        ctx: &RunContext<C>,
        _agent: &str,
        input: &[RunItem],
    ) -> impl Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send {
        (self.0)(ctx.clone(), input.to_vec())
    }
}

/// Adapts an async closure over the output value into a check.
pub struct OutputCheckFn<F>(F);

impl<C, F, Fut> OutputCheck<C> for OutputCheckFn<F>
where
    F: Fn(RunContext<C>, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send,
{
    fn check(
        &self,
        ctx: &RunContext<C>,
        _agent: &str,
        output: &serde_json::Value,
    ) -> impl Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send {
        (self.0)(ctx.clone(), output.clone())
    }
}

/// A named input guardrail.
pub struct InputGuardrail<C> {
    name: String,
    check: Arc<dyn ErasedInputCheck<C>>,
}

impl<C: Send + Sync + 'static> InputGuardrail<C> {
    /// Wrap a check under a name.
    pub fn new(name: impl Into<String>, check: impl InputCheck<C> + 'static) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Build a guardrail from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext<C>, Vec<RunItem>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send + 'static,
    {
        Self::new(name, CheckFn(f))
    }
}

impl<C> InputGuardrail<C> {
    /// The guardrail's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> Clone for InputGuardrail<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

/// A named output guardrail.
pub struct OutputGuardrail<C> {
    name: String,
    check: Arc<dyn ErasedOutputCheck<C>>,
}

impl<C: Send + Sync + 'static> OutputGuardrail<C> {
    /// Wrap a check under a name.
    pub fn new(name: impl Into<String>, check: impl OutputCheck<C> + 'static) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Build a guardrail from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext<C>, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput, GuardrailError>> + Send + 'static,
    {
        Self::new(name, OutputCheckFn(f))
    }
}

impl<C> OutputGuardrail<C> {
    /// The guardrail's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C> Clone for OutputGuardrail<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

/// Run input guardrails concurrently.
///
/// Every check settles before a verdict is reached. The first failure in
/// declaration order (tripwire or execution error) wins; otherwise all
/// results are returned in declaration order.
pub async fn run_input_guardrails<C>(
    guardrails: &[InputGuardrail<C>],
    ctx: &RunContext<C>,
    agent: &str,
    input: &[RunItem],
) -> Result<Vec<GuardrailResult>, GuardrailFailure> {
    let outcomes = futures::future::join_all(
        guardrails
            .iter()
            .map(|g| g.check.check_dyn(ctx, agent, input)),
    )
    .await;
    settle(guardrails.iter().map(|g| g.name.as_str()), outcomes, agent)
}

/// Run output guardrails concurrently over a candidate final output.
///
/// Same verdict rules as [`run_input_guardrails`].
pub async fn run_output_guardrails<C>(
    guardrails: &[OutputGuardrail<C>],
    ctx: &RunContext<C>,
    agent: &str,
    output: &serde_json::Value,
) -> Result<Vec<GuardrailResult>, GuardrailFailure> {
    let outcomes = futures::future::join_all(
        guardrails
            .iter()
            .map(|g| g.check.check_dyn(ctx, agent, output)),
    )
    .await;
    settle(guardrails.iter().map(|g| g.name.as_str()), outcomes, agent)
}

fn settle<'a>(
    names: impl Iterator<Item = &'a str>,
    outcomes: Vec<Result<GuardrailFunctionOutput, GuardrailError>>,
    agent: &str,
) -> Result<Vec<GuardrailResult>, GuardrailFailure> {
    let mut results = Vec::with_capacity(outcomes.len());
    for (name, outcome) in names.zip(outcomes) {
        match outcome {
            Ok(output) if output.tripwire_triggered => {
                tracing::warn!(guardrail = %name, agent = %agent, "baton.guardrail.tripwire");
                return Err(GuardrailFailure::Tripwire(GuardrailResult {
                    guardrail: name.to_string(),
                    agent: agent.to_string(),
                    output,
                }));
            }
            Ok(output) => {
                tracing::debug!(guardrail = %name, agent = %agent, "baton.guardrail.pass");
                results.push(GuardrailResult {
                    guardrail: name.to_string(),
                    agent: agent.to_string(),
                    output,
                });
            }
            Err(source) => {
                tracing::warn!(guardrail = %name, agent = %agent, error = %source, "baton.guardrail.error");
                return Err(GuardrailFailure::Execution {
                    guardrail: name.to_string(),
                    source,
                });
            }
        }
    }
    Ok(results)
}
