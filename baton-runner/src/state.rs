//! Serializable run state: the unit of suspension and resumption.
//!
//! A [`RunState`] holds plain data only. Agents are referenced by name and
//! resolved against the starting agent's hand-off graph when a run resumes.

use std::collections::BTreeSet;

use baton_types::{ApprovalKind, ApprovalRequestItem, RunItem, ToolCallItem, Usage};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Layout version written by [`RunState::to_json`].
pub const RUN_STATE_VERSION: u32 = 1;

/// A human decision on an interruption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    /// Run the call.
    Approved,
    /// Do not run the call; the model is told why.
    Rejected {
        /// Explanation passed to the model.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// A call blocked on a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interruption {
    /// The blocked call.
    pub call_id: String,
    /// Tool or hand-off name.
    pub name: String,
    /// Raw argument text, enough to re-issue the call.
    pub arguments: String,
    /// Agent that issued the call.
    pub agent: String,
    /// Whether a tool or a hand-off is blocked.
    pub kind: ApprovalKind,
    /// The decision, once made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<ApprovalDecision>,
}

impl Interruption {
    pub(crate) fn for_tool(call: &ToolCallItem, agent: &str) -> Self {
        Self {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            agent: agent.to_string(),
            kind: ApprovalKind::Tool,
            decision: None,
        }
    }

    /// Whether a decision has been recorded.
    pub fn is_resolved(&self) -> bool {
        self.decision.is_some()
    }

    /// The tool call this interruption re-issues.
    pub fn to_tool_call(&self) -> ToolCallItem {
        ToolCallItem {
            call_id: self.call_id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }

    pub(crate) fn to_request_item(&self) -> RunItem {
        RunItem::ApprovalRequest(ApprovalRequestItem {
            call_id: self.call_id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
            agent: self.agent.clone(),
            kind: self.kind,
        })
    }
}

/// Snapshot of an in-progress, suspended or failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub(crate) version: u32,
    pub(crate) current_agent: String,
    pub(crate) original_input: Vec<RunItem>,
    pub(crate) history: Vec<RunItem>,
    pub(crate) agent_view: Vec<RunItem>,
    pub(crate) interruptions: Vec<Interruption>,
    pub(crate) turn_count: u32,
    pub(crate) max_turns: u32,
    pub(crate) usage: Usage,
    pub(crate) turn_usage: Vec<Usage>,
    #[serde(default)]
    pub(crate) conversation_id: Option<String>,
    #[serde(default)]
    pub(crate) previous_response_id: Option<String>,
    #[serde(default)]
    pub(crate) input_guardrails_done: bool,
    #[serde(default)]
    pub(crate) always_approved: BTreeSet<String>,
    #[serde(default)]
    pub(crate) candidate_output: Option<serde_json::Value>,
    #[serde(default)]
    pub(crate) session_items: usize,
}

impl RunState {
    /// A fresh state for `agent` with the given input.
    pub fn new(agent: impl Into<String>, input: Vec<RunItem>, max_turns: u32) -> Self {
        let agent_view = input
            .iter()
            .filter(|item| item.is_model_visible())
            .cloned()
            .collect();
        Self {
            version: RUN_STATE_VERSION,
            current_agent: agent.into(),
            original_input: input.clone(),
            history: input,
            agent_view,
            interruptions: Vec::new(),
            turn_count: 0,
            max_turns,
            usage: Usage::default(),
            turn_usage: Vec::new(),
            conversation_id: None,
            previous_response_id: None,
            input_guardrails_done: false,
            always_approved: BTreeSet::new(),
            candidate_output: None,
            session_items: 0,
        }
    }

    /// Name of the agent in control.
    pub fn current_agent(&self) -> &str {
        &self.current_agent
    }

    /// The input the run started with.
    pub fn original_input(&self) -> &[RunItem] {
        &self.original_input
    }

    /// Every item of the run, in order.
    pub fn history(&self) -> &[RunItem] {
        &self.history
    }

    /// Items generated by the run (history after the original input).
    pub fn new_items(&self) -> &[RunItem] {
        &self.history[self.original_input.len().min(self.history.len())..]
    }

    /// What the current agent sends to the model. Differs from
    /// [`RunState::history`] after a filtered hand-off.
    pub fn agent_view(&self) -> &[RunItem] {
        &self.agent_view
    }

    /// All interruptions, decided or not.
    pub fn interruptions(&self) -> &[Interruption] {
        &self.interruptions
    }

    /// Interruptions still awaiting a decision.
    pub fn pending_interruptions(&self) -> impl Iterator<Item = &Interruption> {
        self.interruptions.iter().filter(|i| !i.is_resolved())
    }

    /// Whether the run is waiting on a human decision.
    pub fn is_suspended(&self) -> bool {
        self.pending_interruptions().next().is_some()
    }

    /// Model calls made so far.
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    /// The turn budget.
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Usage summed over the run.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Usage of each turn, in order.
    pub fn turn_usage(&self) -> &[Usage] {
        &self.turn_usage
    }

    /// Backend-side conversation identifier.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Identifier of the last backend response.
    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    /// Approve the call with the given id.
    pub fn approve(&mut self, call_id: &str) -> Result<(), StateError> {
        self.decide(call_id, ApprovalDecision::Approved)
    }

    /// Reject the call with the given id. The model sees `reason`, if any.
    pub fn reject(&mut self, call_id: &str, reason: Option<String>) -> Result<(), StateError> {
        self.decide(call_id, ApprovalDecision::Rejected { reason })
    }

    /// Approve every undecided interruption.
    pub fn approve_all(&mut self) {
        for interruption in self.interruptions.iter_mut().filter(|i| !i.is_resolved()) {
            interruption.decision = Some(ApprovalDecision::Approved);
        }
    }

    /// Reject every undecided interruption.
    pub fn reject_all(&mut self, reason: Option<String>) {
        for interruption in self.interruptions.iter_mut().filter(|i| !i.is_resolved()) {
            interruption.decision = Some(ApprovalDecision::Rejected {
                reason: reason.clone(),
            });
        }
    }

    /// Approve pending calls to `tool` and skip approval for it for the rest of the run.
    pub fn always_approve_tool(&mut self, tool: &str) {
        self.always_approved.insert(tool.to_string());
        for interruption in self
            .interruptions
            .iter_mut()
            .filter(|i| !i.is_resolved() && i.kind == ApprovalKind::Tool && i.name == tool)
        {
            interruption.decision = Some(ApprovalDecision::Approved);
        }
    }

    /// Whether calls to `tool` skip approval.
    pub fn is_always_approved(&self, tool: &str) -> bool {
        self.always_approved.contains(tool)
    }

    /// Serialize to JSON for storage between suspend and resume.
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore from [`RunState::to_json`] output.
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        let state: RunState = serde_json::from_str(json)?;
        if state.version != RUN_STATE_VERSION {
            return Err(StateError::Version {
                found: state.version,
                expected: RUN_STATE_VERSION,
            });
        }
        Ok(state)
    }

    fn decide(&mut self, call_id: &str, decision: ApprovalDecision) -> Result<(), StateError> {
        let interruption = self
            .interruptions
            .iter_mut()
            .find(|i| i.call_id == call_id)
            .ok_or_else(|| StateError::UnknownCall(call_id.to_string()))?;
        interruption.decision = Some(decision);
        Ok(())
    }

    /// Append to history, and to the agent's view if the model may see it.
    pub(crate) fn append(&mut self, item: RunItem) {
        if item.is_model_visible() {
            self.agent_view.push(item.clone());
        }
        self.history.push(item);
    }

    pub(crate) fn record_usage(&mut self, usage: Usage) {
        self.usage += &usage;
        self.turn_usage.push(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended() -> RunState {
        let mut state = RunState::new("ops", vec![RunItem::user("restart prod")], 10);
        let call = ToolCallItem {
            call_id: "c1".into(),
            name: "restart".into(),
            arguments: r#"{"service":"api"}"#.into(),
        };
        state.append(RunItem::ToolCall(call.clone()));
        let interruption = Interruption::for_tool(&call, "ops");
        state.append(interruption.to_request_item());
        state.interruptions.push(interruption);
        state
    }

    #[test]
    fn fresh_state_mirrors_input() {
        let state = RunState::new("a", vec![RunItem::user("hi")], 5);
        assert_eq!(state.history(), state.agent_view());
        assert!(state.new_items().is_empty());
        assert_eq!(state.max_turns(), 5);
        assert!(!state.is_suspended());
    }

    #[test]
    fn approval_requests_stay_out_of_agent_view() {
        let state = suspended();
        assert_eq!(state.history().len(), 3);
        assert_eq!(state.agent_view().len(), 2);
        assert_eq!(state.new_items().len(), 2);
    }

    #[test]
    fn approve_resolves_interruption() {
        let mut state = suspended();
        assert!(state.is_suspended());
        state.approve("c1").unwrap();
        assert!(!state.is_suspended());
        assert_eq!(
            state.interruptions()[0].decision,
            Some(ApprovalDecision::Approved)
        );
    }

    #[test]
    fn unknown_call_is_an_error() {
        let mut state = suspended();
        let err = state.reject("nope", None).unwrap_err();
        assert!(matches!(err, StateError::UnknownCall(id) if id == "nope"));
    }

    #[test]
    fn always_approve_covers_pending_calls() {
        let mut state = suspended();
        state.always_approve_tool("restart");
        assert!(!state.is_suspended());
        assert!(state.is_always_approved("restart"));
    }

    #[test]
    fn json_round_trip_preserves_decisions() {
        let mut state = suspended();
        state.reject("c1", Some("not during business hours".into())).unwrap();
        let restored = RunState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn persisted_layout_is_plain_record() {
        let value = serde_json::to_value(suspended()).unwrap();
        for key in ["history", "current_agent", "interruptions", "turn_count", "usage", "max_turns"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["interruptions"][0]["kind"], "tool");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut value = serde_json::to_value(suspended()).unwrap();
        value["version"] = serde_json::json!(99);
        let err = RunState::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, StateError::Version { found: 99, .. }));
    }
}
