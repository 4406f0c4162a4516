//! What a run hands back.

use std::fmt;
use std::sync::Arc;

use baton_guardrail::GuardrailResult;
use baton_types::{RunItem, Usage, ValidationError, from_value};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::agent::Agent;
use crate::state::{Interruption, RunState};

/// Outcome of a run that completed or suspended.
///
/// A suspended run has no final output and at least one pending
/// interruption. Decide each one on [`RunResult::into_state`] and resume.
pub struct RunResult<C> {
    pub(crate) final_output: Option<serde_json::Value>,
    pub(crate) last_agent: Arc<Agent<C>>,
    pub(crate) state: RunState,
    pub(crate) input_guardrail_results: Vec<GuardrailResult>,
    pub(crate) output_guardrail_results: Vec<GuardrailResult>,
}

impl<C: Send + Sync> RunResult<C> {
    /// The validated final output, absent while suspended.
    pub fn final_output(&self) -> Option<&serde_json::Value> {
        self.final_output.as_ref()
    }

    /// The final output as text, when the agent produced free text.
    pub fn final_output_text(&self) -> Option<&str> {
        self.final_output.as_ref().and_then(|v| v.as_str())
    }

    /// The final output deserialized into `T`.
    pub fn final_output_as<T>(&self) -> Result<Option<T>, ValidationError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        self.final_output.clone().map(from_value).transpose()
    }

    /// Whether the run stopped for human approval.
    pub fn is_interrupted(&self) -> bool {
        self.state.is_suspended()
    }

    /// Calls awaiting a decision.
    pub fn interruptions(&self) -> Vec<&Interruption> {
        self.state.pending_interruptions().collect()
    }

    /// The agent in control when the run stopped.
    pub fn last_agent(&self) -> &Arc<Agent<C>> {
        &self.last_agent
    }

    /// Every item of the run.
    pub fn history(&self) -> &[RunItem] {
        self.state.history()
    }

    /// Items generated by this run.
    pub fn new_items(&self) -> &[RunItem] {
        self.state.new_items()
    }

    /// Usage summed over the run.
    pub fn usage(&self) -> &Usage {
        self.state.usage()
    }

    /// The run state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Take the run state, e.g. to decide interruptions and resume.
    pub fn into_state(self) -> RunState {
        self.state
    }

    /// History as input for a follow-up run, approval requests removed.
    pub fn to_input_list(&self) -> Vec<RunItem> {
        self.state
            .history()
            .iter()
            .filter(|item| item.is_model_visible())
            .cloned()
            .collect()
    }

    /// Results of the input guardrails that passed.
    pub fn input_guardrail_results(&self) -> &[GuardrailResult] {
        &self.input_guardrail_results
    }

    /// Results of the output guardrails that passed.
    pub fn output_guardrail_results(&self) -> &[GuardrailResult] {
        &self.output_guardrail_results
    }
}

impl<C> fmt::Debug for RunResult<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunResult")
            .field("final_output", &self.final_output)
            .field("last_agent", &self.last_agent)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
