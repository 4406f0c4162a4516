//! Error types for runs, hand-offs, sessions and persisted state.

use baton_guardrail::{GuardrailError, GuardrailResult};
use baton_tool::ToolError;
use baton_types::{ModelError, ValidationError};
use thiserror::Error;

use crate::state::RunState;

/// Errors from resolving a hand-off.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The hand-off arguments did not match the declared input shape.
    #[error("invalid hand-off input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The on-hand-off callback failed.
    #[error("hand-off callback failed: {0}")]
    Callback(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from session storage.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// The storage backend failed.
    #[error("session backend failed: {0}")]
    Backend(String),

    /// Items could not be encoded or decoded.
    #[error("session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from reading or updating a persisted run state.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StateError {
    /// The serialized form could not be encoded or decoded.
    #[error("invalid run state: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The serialized form was written by an incompatible version.
    #[error("unsupported run state version {found} (expected {expected})")]
    Version {
        /// Version found in the payload.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// No interruption exists for the given call.
    #[error("no pending interruption for call `{0}`")]
    UnknownCall(String),
}

/// Errors that end a run.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RunError {
    /// The turn budget ran out.
    #[error("max turns ({max_turns}) exceeded")]
    MaxTurnsExceeded {
        /// The configured budget.
        max_turns: u32,
    },

    /// The agent's final output did not match its declared shape.
    #[error("final output of agent `{agent}` failed validation: {source}")]
    OutputValidation {
        /// Agent that produced the output.
        agent: String,
        /// The validation failure.
        #[source]
        source: ValidationError,
    },

    /// An input guardrail tripped before any model call.
    #[error("input guardrail `{}` tripwire triggered", .0.guardrail)]
    InputGuardrailTripwire(GuardrailResult),

    /// An output guardrail tripped; the candidate output was discarded.
    #[error("output guardrail `{}` tripwire triggered", .0.guardrail)]
    OutputGuardrailTripwire(GuardrailResult),

    /// A guardrail check could not run. Resume `state` with a different guardrail set.
    #[error("guardrail `{guardrail}` failed to run: {source}")]
    GuardrailExecution {
        /// Guardrail name.
        guardrail: String,
        /// The underlying failure.
        #[source]
        source: GuardrailError,
        /// Run state at the failure point.
        state: Box<RunState>,
    },

    /// A tool that propagates its errors failed. Resume `state` to retry it.
    #[error("tool `{tool}` failed: {source}")]
    ToolCall {
        /// Tool name.
        tool: String,
        /// The underlying failure.
        #[source]
        source: ToolError,
        /// Run state at the failure point.
        state: Box<RunState>,
    },

    /// The model backend produced something the engine cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The model requested a hand-off the agent does not declare.
    #[error("agent `{agent}` has no hand-off named `{target}`")]
    UnknownHandoffTarget {
        /// Agent that issued the call.
        agent: String,
        /// The requested target.
        target: String,
    },

    /// A declared hand-off could not be completed.
    #[error("hand-off `{handoff}` failed: {source}")]
    Handoff {
        /// Hand-off tool name.
        handoff: String,
        /// The underlying failure.
        #[source]
        source: HandoffError,
    },

    /// The model backend failed.
    #[error("model backend failed: {0}")]
    Model(#[from] ModelError),

    /// Resume was attempted before every interruption had a decision.
    #[error("{pending} interruption(s) still awaiting a decision")]
    UnresolvedInterruptions {
        /// Number of undecided interruptions.
        pending: usize,
    },

    /// A referenced agent is not reachable from the starting agent.
    #[error("agent `{0}` is not reachable from the starting agent")]
    UnknownAgent(String),

    /// The session store failed.
    #[error("session failed: {0}")]
    Session(#[from] SessionError),

    /// The background task driving a streamed run died.
    #[error("run task failed: {0}")]
    Task(String),

    /// The caller cancelled the run.
    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// The run state carried by recoverable errors.
    pub fn state(&self) -> Option<&RunState> {
        match self {
            RunError::GuardrailExecution { state, .. } | RunError::ToolCall { state, .. } => {
                Some(state)
            }
            _ => None,
        }
    }

    /// Take the run state out of a recoverable error.
    pub fn into_state(self) -> Option<RunState> {
        match self {
            RunError::GuardrailExecution { state, .. } | RunError::ToolCall { state, .. } => {
                Some(*state)
            }
            _ => None,
        }
    }

    /// Whether the caller can retry from [`RunError::state`].
    pub fn is_recoverable(&self) -> bool {
        self.state().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_guardrail::GuardrailFunctionOutput;
    use serde_json::json;

    #[test]
    fn tripwire_display_names_guardrail() {
        let err = RunError::InputGuardrailTripwire(GuardrailResult {
            guardrail: "no_pii".into(),
            agent: "triage".into(),
            output: GuardrailFunctionOutput::tripwire(json!("ssn")),
        });
        assert_eq!(err.to_string(), "input guardrail `no_pii` tripwire triggered");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn tool_call_error_carries_state() {
        let state = RunState::new("agent", vec![], 10);
        let err = RunError::ToolCall {
            tool: "deploy".into(),
            source: ToolError::failed("boom"),
            state: Box::new(state.clone()),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.state(), Some(&state));
        assert_eq!(err.to_string(), "tool `deploy` failed: execution failed: boom");
        assert_eq!(err.into_state(), Some(state));
    }

    #[test]
    fn budget_error_is_terminal() {
        let err = RunError::MaxTurnsExceeded { max_turns: 3 };
        assert_eq!(err.to_string(), "max turns (3) exceeded");
        assert!(err.state().is_none());
    }
}
