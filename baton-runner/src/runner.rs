//! The turn loop.
//!
//! One [`Runner`] wraps one model backend. Each call to [`Runner::run`] or
//! [`Runner::resume`] drives a private `RunLoop` that owns the run state
//! until the run finalizes, suspends or fails.

use std::collections::HashMap;
use std::sync::Arc;

use baton_guardrail::{GuardrailFailure, GuardrailResult, run_input_guardrails, run_output_guardrails};
use baton_types::{
    ApprovalKind, HandoffCallItem, HandoffOutputItem, Model, ModelRequest, ModelResponse,
    ModelStreamEvent, RunContext, RunItem, ToolCallItem,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::agent::{Agent, ToolUseBehavior};
use crate::config::{RunConfig, RunInput};
use crate::error::RunError;
use crate::handoff::{AgentRegistry, Handoff, HandoffInputData};
use crate::hooks::HookSet;
use crate::result::RunResult;
use crate::state::{ApprovalDecision, Interruption, RunState};
use crate::stream::{StreamProjector, StreamedRun, TextAccumulator};
use crate::tool_exec::{self, Executed, Planned};

const SKIPPED_FOR_HANDOFF: &str = "Tool call skipped: a hand-off was requested in the same turn.";
const EXTRA_HANDOFF: &str = "Multiple hand-offs detected; ignoring this one.";

/// Drives agents against a model backend.
pub struct Runner<M> {
    model: Arc<M>,
}

impl<M> Clone for Runner<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

impl<M: Model + 'static> Runner<M> {
    /// Create a runner for `model`.
    pub fn new(model: M) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    /// Create a runner sharing an existing backend.
    pub fn from_arc(model: Arc<M>) -> Self {
        Self { model }
    }

    /// The backend.
    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    /// Run `agent` on `input` until it produces a final output, suspends
    /// for approval or fails.
    pub async fn run<C>(
        &self,
        agent: &Arc<Agent<C>>,
        input: impl Into<RunInput>,
        context: C,
        config: RunConfig<C>,
    ) -> Result<RunResult<C>, RunError>
    where
        C: Send + Sync + 'static,
    {
        self.start(agent, input.into(), context, config, StreamProjector::default())
            .await
    }

    /// Continue a suspended or failed run.
    ///
    /// `agent` is the agent the run originally started with; the agent in
    /// control is found by name in its hand-off graph. Every interruption
    /// must carry a decision. The turn budget stored in `state` applies.
    pub async fn resume<C>(
        &self,
        agent: &Arc<Agent<C>>,
        state: RunState,
        context: C,
        config: RunConfig<C>,
    ) -> Result<RunResult<C>, RunError>
    where
        C: Send + Sync + 'static,
    {
        self.continue_from(agent, state, context, config, StreamProjector::default())
            .await
    }

    /// Like [`Runner::run`], but executes in a background task and streams
    /// lifecycle events while it runs.
    pub fn run_streamed<C>(
        &self,
        agent: &Arc<Agent<C>>,
        input: impl Into<RunInput>,
        context: C,
        mut config: RunConfig<C>,
    ) -> StreamedRun<C>
    where
        C: Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = config.cancellation.child_token();
        config.cancellation = cancel.clone();
        let runner = self.clone();
        let agent = Arc::clone(agent);
        let input = input.into();
        let handle = tokio::spawn(async move {
            runner
                .start(&agent, input, context, config, StreamProjector::new(Some(tx)))
                .await
        });
        StreamedRun {
            events: rx,
            handle,
            cancel,
        }
    }

    /// Like [`Runner::resume`], streaming lifecycle events.
    pub fn resume_streamed<C>(
        &self,
        agent: &Arc<Agent<C>>,
        state: RunState,
        context: C,
        mut config: RunConfig<C>,
    ) -> StreamedRun<C>
    where
        C: Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = config.cancellation.child_token();
        config.cancellation = cancel.clone();
        let runner = self.clone();
        let agent = Arc::clone(agent);
        let handle = tokio::spawn(async move {
            runner
                .continue_from(&agent, state, context, config, StreamProjector::new(Some(tx)))
                .await
        });
        StreamedRun {
            events: rx,
            handle,
            cancel,
        }
    }

    async fn start<C>(
        &self,
        agent: &Arc<Agent<C>>,
        input: RunInput,
        context: C,
        config: RunConfig<C>,
        projector: StreamProjector,
    ) -> Result<RunResult<C>, RunError>
    where
        C: Send + Sync + 'static,
    {
        let RunInput(items) = input;
        let mut input_items = match &config.session {
            Some(session) => session.get_items(None).await?,
            None => Vec::new(),
        };
        let stored = input_items.len();
        input_items.extend(items);

        let mut state = RunState::new(agent.name(), input_items, config.max_turns);
        state.session_items = stored;
        state.conversation_id = config.conversation_id.clone();
        state.previous_response_id = config.previous_response_id.clone();

        let run_loop = RunLoop {
            model: Arc::clone(&self.model),
            registry: AgentRegistry::from_root(agent),
            agent: Arc::clone(agent),
            agent_started: false,
            state,
            context: Arc::new(context),
            config,
            projector,
            input_guardrail_results: Vec::new(),
        };
        run_loop.drive(false).await
    }

    async fn continue_from<C>(
        &self,
        agent: &Arc<Agent<C>>,
        state: RunState,
        context: C,
        config: RunConfig<C>,
        projector: StreamProjector,
    ) -> Result<RunResult<C>, RunError>
    where
        C: Send + Sync + 'static,
    {
        let registry = AgentRegistry::from_root(agent);
        let current = registry
            .get(state.current_agent())
            .ok_or_else(|| RunError::UnknownAgent(state.current_agent().to_string()))?;

        let run_loop = RunLoop {
            model: Arc::clone(&self.model),
            registry,
            agent: current,
            agent_started: false,
            state,
            context: Arc::new(context),
            config,
            projector,
            input_guardrail_results: Vec::new(),
        };
        run_loop.drive(true).await
    }
}

/// Where the loop goes after a turn.
enum NextStep {
    RunAgain,
    Final(serde_json::Value),
    Interrupted,
}

struct RunLoop<M, C> {
    model: Arc<M>,
    registry: AgentRegistry<C>,
    agent: Arc<Agent<C>>,
    agent_started: bool,
    state: RunState,
    context: Arc<C>,
    config: RunConfig<C>,
    projector: StreamProjector,
    input_guardrail_results: Vec<GuardrailResult>,
}

impl<M, C> RunLoop<M, C>
where
    M: Model,
    C: Send + Sync + 'static,
{
    async fn drive(self, resumed: bool) -> Result<RunResult<C>, RunError> {
        let span = tracing::info_span!(
            "agent_run",
            agent = %self.agent.name(),
            workflow = %self.config.workflow_name,
            resumed,
        );
        self.execute(resumed).instrument(span).await
    }

    async fn execute(mut self, resumed: bool) -> Result<RunResult<C>, RunError> {
        self.projector.agent_updated(self.agent.name());

        let mut step = NextStep::RunAgain;
        if resumed {
            let pending = self.state.pending_interruptions().count();
            if pending > 0 {
                return Err(RunError::UnresolvedInterruptions { pending });
            }
            if !self.state.interruptions.is_empty() {
                step = self.resolve_interruptions().await?;
            }
        }
        if let Some(candidate) = self.state.candidate_output.take() {
            step = NextStep::Final(candidate);
        }

        loop {
            match step {
                NextStep::Final(output) => return self.finalize(output).await,
                NextStep::Interrupted => return self.suspend().await,
                NextStep::RunAgain => {}
            }
            let span = tracing::info_span!(
                "turn",
                turn = self.state.turn_count + 1,
                agent = %self.agent.name(),
            );
            step = self.turn().instrument(span).await?;
        }
    }

    async fn turn(&mut self) -> Result<NextStep, RunError> {
        self.check_cancelled()?;
        if !self.state.input_guardrails_done {
            self.input_guardrails().await?;
        }
        if self.state.turn_count >= self.state.max_turns {
            tracing::warn!(max_turns = self.state.max_turns, "baton.run.max_turns_exceeded");
            return Err(RunError::MaxTurnsExceeded {
                max_turns: self.state.max_turns,
            });
        }
        self.state.turn_count += 1;

        let agent = Arc::clone(&self.agent);
        let ctx = self.context_snapshot();
        let hooks = HookSet::new(self.config.hooks.as_ref(), &agent);
        if !self.agent_started {
            hooks.agent_start(&ctx, &agent).await;
            self.agent_started = true;
        }

        let request = self.build_request(&ctx);
        hooks.llm_start(&ctx, &agent, &request).await;
        tracing::debug!(
            agent = %agent.name(),
            turn = self.state.turn_count,
            items = request.input.len(),
            "baton.turn.model_call"
        );
        let response = self.call_model(request).await?;
        self.state.record_usage(response.usage);
        if let Some(id) = &response.response_id {
            self.state.previous_response_id = Some(id.clone());
        }
        let ctx = self.context_snapshot();
        hooks.llm_end(&ctx, &agent, &response).await;

        let turn_start = self.state.agent_view.len();
        let items = self.classify(response.output)?;
        for item in &items {
            self.append(item.clone());
        }
        self.dispatch(&items, turn_start).await
    }

    /// Turn tool calls naming a hand-off into hand-off calls and reject
    /// items only the engine may produce.
    fn classify(&self, output: Vec<RunItem>) -> Result<Vec<RunItem>, RunError> {
        output
            .into_iter()
            .map(|item| match item {
                RunItem::ToolCall(call) if self.agent.find_handoff(&call.name).is_some() => {
                    Ok(RunItem::HandoffCall(HandoffCallItem {
                        call_id: call.call_id,
                        name: call.name,
                        arguments: call.arguments,
                    }))
                }
                RunItem::HandoffCall(call) if self.agent.find_handoff(&call.name).is_none() => {
                    Err(RunError::UnknownHandoffTarget {
                        agent: self.agent.name().to_string(),
                        target: call.name,
                    })
                }
                unexpected @ (RunItem::ToolCallOutput(_)
                | RunItem::HandoffOutput(_)
                | RunItem::ApprovalRequest(_)) => Err(RunError::Protocol(format!(
                    "model returned a `{}` item",
                    unexpected.kind()
                ))),
                other @ (RunItem::Message(_)
                | RunItem::ToolCall(_)
                | RunItem::HandoffCall(_)
                | RunItem::Reasoning(_)) => Ok(other),
            })
            .collect()
    }

    async fn dispatch(&mut self, items: &[RunItem], turn_start: usize) -> Result<NextStep, RunError> {
        let mut handoffs = Vec::new();
        let mut tool_calls = Vec::new();
        for item in items {
            match item {
                RunItem::HandoffCall(call) => handoffs.push(call.clone()),
                RunItem::ToolCall(call) => tool_calls.push(call.clone()),
                RunItem::Message(_) | RunItem::Reasoning(_) => {}
                RunItem::ToolCallOutput(_) | RunItem::HandoffOutput(_) | RunItem::ApprovalRequest(_) => {}
            }
        }

        if !handoffs.is_empty() {
            let chosen = handoffs.remove(0);
            for extra in handoffs {
                tracing::warn!(handoff = %extra.name, "baton.handoff.ignored");
                self.append(RunItem::tool_output(extra.call_id, EXTRA_HANDOFF, true));
            }
            for call in tool_calls {
                tracing::debug!(tool = %call.name, "baton.tool.skipped_for_handoff");
                self.append(RunItem::tool_output(call.call_id, SKIPPED_FOR_HANDOFF, true));
            }
            return self.begin_handoff(chosen, turn_start).await;
        }

        if !tool_calls.is_empty() {
            return self.run_tools(tool_calls, false, HashMap::new()).await;
        }

        let Some(text) = items
            .iter()
            .rev()
            .find(|item| item.is_assistant_message())
            .and_then(RunItem::text)
        else {
            return Ok(NextStep::RunAgain);
        };
        let output = self
            .agent
            .output_schema()
            .validate(&text)
            .map_err(|source| RunError::OutputValidation {
                agent: self.agent.name().to_string(),
                source,
            })?;
        Ok(NextStep::Final(output))
    }

    /// Execute one batch of calls. `rejected` maps call ids a human turned
    /// down to the output the model sees instead; every other call in a
    /// resumed batch counts as approved.
    async fn run_tools(
        &mut self,
        calls: Vec<ToolCallItem>,
        preapproved: bool,
        mut rejected: HashMap<String, String>,
    ) -> Result<NextStep, RunError> {
        let agent = Arc::clone(&self.agent);
        let ctx = self.context_snapshot();
        let planned = calls
            .iter()
            .map(|call| match rejected.remove(&call.call_id) {
                Some(output) => Ok(Planned::Respond {
                    call: call.clone(),
                    output,
                }),
                None => tool_exec::plan(&agent, call, &ctx, &self.state, preapproved),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let hooks = HookSet::new(self.config.hooks.as_ref(), &agent);
        let cancel = self.config.cancellation.clone();
        let executed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(agent = %agent.name(), "baton.run.cancelled");
                return Err(RunError::Cancelled);
            }
            executed = tool_exec::execute(planned, &ctx, &hooks, &agent) => executed,
        };

        let mut finished = Vec::new();
        let mut pending = Vec::new();
        let mut failures = Vec::new();
        for outcome in executed {
            match outcome {
                Executed::Output { call, item } => {
                    if let RunItem::ToolCallOutput(out) = &item {
                        if !out.is_error {
                            finished.push((call.name.clone(), out.output.clone()));
                        }
                    }
                    self.append(item);
                }
                Executed::Pending { call } => pending.push(call),
                Executed::Failed { call, error } => failures.push((call, error)),
            }
        }

        for call in &pending {
            let interruption = Interruption::for_tool(call, agent.name());
            self.append(interruption.to_request_item());
            self.state.interruptions.push(interruption);
        }

        if !failures.is_empty() {
            for (call, _) in &failures {
                let mut retry = Interruption::for_tool(call, agent.name());
                retry.decision = Some(ApprovalDecision::Approved);
                self.state.interruptions.push(retry);
            }
            let (call, source) = failures.remove(0);
            return Err(RunError::ToolCall {
                tool: call.name,
                source,
                state: Box::new(self.state.clone()),
            });
        }

        if !pending.is_empty() {
            return Ok(NextStep::Interrupted);
        }

        let stop = match agent.tool_use_behavior() {
            ToolUseBehavior::RunLlmAgain => None,
            ToolUseBehavior::StopOnFirstTool => finished.into_iter().next(),
            ToolUseBehavior::StopAtTools(names) => {
                finished.into_iter().find(|(name, _)| names.contains(name))
            }
        };
        Ok(match stop {
            Some((tool, output)) => {
                tracing::debug!(tool = %tool, "baton.tool.final_output");
                NextStep::Final(serde_json::Value::String(output))
            }
            None => NextStep::RunAgain,
        })
    }

    async fn begin_handoff(
        &mut self,
        call: HandoffCallItem,
        split: usize,
    ) -> Result<NextStep, RunError> {
        let handoff = self.find_handoff(&call.name)?;
        if handoff.requires_approval() {
            let interruption = Interruption {
                call_id: call.call_id,
                name: call.name,
                arguments: call.arguments,
                agent: self.agent.name().to_string(),
                kind: ApprovalKind::Handoff,
                decision: None,
            };
            self.append(interruption.to_request_item());
            self.state.interruptions.push(interruption);
            return Ok(NextStep::Interrupted);
        }
        self.perform_handoff(&handoff, call, split).await
    }

    async fn perform_handoff(
        &mut self,
        handoff: &Handoff<C>,
        call: HandoffCallItem,
        split: usize,
    ) -> Result<NextStep, RunError> {
        let source = Arc::clone(&self.agent);
        let ctx = self.context_snapshot();
        let target = handoff.resolve(&self.registry, &ctx, &call.arguments).await?;

        HookSet::new(self.config.hooks.as_ref(), &source)
            .handoff(&ctx, &source, &target)
            .await;
        tracing::info!(from = %source.name(), to = %target.name(), "baton.handoff");

        self.append(RunItem::HandoffOutput(HandoffOutputItem {
            call_id: call.call_id,
            source_agent: source.name().to_string(),
            target_agent: target.name().to_string(),
            output: serde_json::json!({ "assistant": target.name() }).to_string(),
        }));

        if let Some(filter) = handoff.filter() {
            let mut history = std::mem::take(&mut self.state.agent_view);
            let new_items = history.split_off(split.min(history.len()));
            self.state.agent_view = filter(HandoffInputData { history, new_items }).into_items();
        }

        self.state.current_agent = target.name().to_string();
        self.agent = target;
        self.agent_started = false;
        self.projector.agent_updated(self.agent.name());
        Ok(NextStep::RunAgain)
    }

    /// Apply the decisions recorded on a resumed state.
    async fn resolve_interruptions(&mut self) -> Result<NextStep, RunError> {
        let interruptions = std::mem::take(&mut self.state.interruptions);
        let mut tool_calls = Vec::new();
        let mut rejected = HashMap::new();
        let mut approved_handoff = None;

        for interruption in interruptions {
            match (interruption.kind, &interruption.decision) {
                (ApprovalKind::Tool, Some(ApprovalDecision::Approved)) => {
                    tool_calls.push(interruption.to_tool_call());
                }
                (ApprovalKind::Tool, Some(ApprovalDecision::Rejected { reason })) => {
                    tracing::info!(call_id = %interruption.call_id, tool = %interruption.name, "baton.approval.rejected");
                    let output = rejection_message(ApprovalKind::Tool, reason.as_deref());
                    rejected.insert(interruption.call_id.clone(), output);
                    tool_calls.push(interruption.to_tool_call());
                }
                (ApprovalKind::Handoff, Some(ApprovalDecision::Approved)) => {
                    approved_handoff = Some(interruption);
                }
                (ApprovalKind::Handoff, Some(ApprovalDecision::Rejected { reason })) => {
                    tracing::info!(call_id = %interruption.call_id, handoff = %interruption.name, "baton.approval.rejected");
                    let output = rejection_message(ApprovalKind::Handoff, reason.as_deref());
                    self.append(RunItem::tool_output(interruption.call_id, output, true));
                }
                (_, None) => {
                    return Err(RunError::UnresolvedInterruptions { pending: 1 });
                }
            }
        }

        if let Some(interruption) = approved_handoff {
            let handoff = self.find_handoff(&interruption.name)?;
            let split = self
                .state
                .agent_view
                .iter()
                .position(|item| {
                    matches!(item, RunItem::HandoffCall(c) if c.call_id == interruption.call_id)
                })
                .unwrap_or(self.state.agent_view.len());
            let call = HandoffCallItem {
                call_id: interruption.call_id,
                name: interruption.name,
                arguments: interruption.arguments,
            };
            return self.perform_handoff(&handoff, call, split).await;
        }

        if tool_calls.is_empty() {
            return Ok(NextStep::RunAgain);
        }
        self.run_tools(tool_calls, true, rejected).await
    }

    async fn input_guardrails(&mut self) -> Result<(), RunError> {
        let guardrails: Vec<_> = self
            .config
            .input_guardrails
            .iter()
            .chain(self.agent.input_guardrails())
            .cloned()
            .collect();
        if !guardrails.is_empty() {
            let ctx = self.context_snapshot();
            let cancel = self.config.cancellation.clone();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RunError::Cancelled),
                outcome = run_input_guardrails(&guardrails, &ctx, self.agent.name(), &self.state.original_input) => outcome,
            };
            self.input_guardrail_results = outcome.map_err(|f| self.guardrail_failure(f, true))?;
        }
        self.state.input_guardrails_done = true;
        Ok(())
    }

    async fn output_guardrails(
        &self,
        output: &serde_json::Value,
    ) -> Result<Vec<GuardrailResult>, RunError> {
        let guardrails: Vec<_> = self
            .config
            .output_guardrails
            .iter()
            .chain(self.agent.output_guardrails())
            .cloned()
            .collect();
        if guardrails.is_empty() {
            return Ok(Vec::new());
        }
        let ctx = self.context_snapshot();
        let cancel = self.config.cancellation.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            outcome = run_output_guardrails(&guardrails, &ctx, self.agent.name(), output) => outcome,
        };
        outcome.map_err(|f| self.guardrail_failure(f, false))
    }

    fn guardrail_failure(&self, failure: GuardrailFailure, input: bool) -> RunError {
        match failure {
            GuardrailFailure::Tripwire(result) if input => RunError::InputGuardrailTripwire(result),
            GuardrailFailure::Tripwire(result) => RunError::OutputGuardrailTripwire(result),
            GuardrailFailure::Execution { guardrail, source } => RunError::GuardrailExecution {
                guardrail,
                source,
                state: Box::new(self.state.clone()),
            },
            other => RunError::Protocol(other.to_string()),
        }
    }

    async fn finalize(mut self, output: serde_json::Value) -> Result<RunResult<C>, RunError> {
        let output_results = match self.output_guardrails(&output).await {
            Ok(results) => results,
            Err(RunError::GuardrailExecution {
                guardrail,
                source,
                mut state,
            }) => {
                state.candidate_output = Some(output);
                return Err(RunError::GuardrailExecution {
                    guardrail,
                    source,
                    state,
                });
            }
            Err(other) => return Err(other),
        };

        let ctx = self.context_snapshot();
        HookSet::new(self.config.hooks.as_ref(), &self.agent)
            .agent_end(&ctx, &self.agent, &output)
            .await;
        self.save_session().await?;
        tracing::info!(
            agent = %self.agent.name(),
            turns = self.state.turn_count,
            total_tokens = self.state.usage.total_tokens,
            "baton.run.complete"
        );

        Ok(RunResult {
            final_output: Some(output),
            last_agent: self.agent,
            state: self.state,
            input_guardrail_results: self.input_guardrail_results,
            output_guardrail_results: output_results,
        })
    }

    async fn suspend(mut self) -> Result<RunResult<C>, RunError> {
        self.save_session().await?;
        tracing::info!(
            agent = %self.agent.name(),
            pending = self.state.pending_interruptions().count(),
            "baton.run.suspended"
        );
        Ok(RunResult {
            final_output: None,
            last_agent: self.agent,
            state: self.state,
            input_guardrail_results: self.input_guardrail_results,
            output_guardrail_results: Vec::new(),
        })
    }

    async fn save_session(&mut self) -> Result<(), RunError> {
        let Some(session) = &self.config.session else {
            return Ok(());
        };
        let history = self.state.history();
        let start = self.state.session_items.min(history.len());
        let items: Vec<RunItem> = history[start..]
            .iter()
            .filter(|item| item.is_model_visible())
            .cloned()
            .collect();
        if !items.is_empty() {
            tracing::debug!(session = %session.session_id(), items = items.len(), "baton.session.save");
            session.add_items(items).await?;
        }
        self.state.session_items = self.state.history.len();
        Ok(())
    }

    async fn call_model(&self, request: ModelRequest) -> Result<ModelResponse, RunError> {
        let cancel = self.config.cancellation.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(agent = %self.agent.name(), "baton.run.cancelled");
                Err(RunError::Cancelled)
            }
            response = self.fetch(request) => response,
        }
    }

    async fn fetch(&self, request: ModelRequest) -> Result<ModelResponse, RunError> {
        if !self.projector.is_streaming() {
            return Ok(self.model.get_response(request).await?);
        }

        let mut stream = self.model.stream_response(request).await?;
        let mut text = self.config.streaming_guardrail_chars.map(TextAccumulator::new);
        while let Some(event) = stream.next().await {
            let event = event?;
            self.projector.raw(&event);
            match event {
                ModelStreamEvent::TextDelta { delta } => {
                    if let Some(acc) = text.as_mut() {
                        if acc.push(&delta) {
                            let partial = serde_json::Value::String(acc.text().to_string());
                            self.output_guardrails(&partial).await?;
                        }
                    }
                }
                ModelStreamEvent::Completed { response } => return Ok(response),
                ModelStreamEvent::ReasoningDelta { .. }
                | ModelStreamEvent::ToolCallStarted { .. }
                | ModelStreamEvent::ToolCallArgumentsDelta { .. } => {}
            }
        }
        Err(RunError::Protocol(
            "model stream ended without a completion marker".to_string(),
        ))
    }

    fn build_request(&self, ctx: &RunContext<C>) -> ModelRequest {
        ModelRequest {
            model: self
                .config
                .model
                .clone()
                .or_else(|| self.agent.model().map(str::to_string)),
            instructions: self.agent.instructions().map(|i| i.resolve(ctx)),
            input: self.state.agent_view.clone(),
            tools: self.agent.tools().specs(),
            handoffs: self.agent.handoffs().iter().map(Handoff::spec).collect(),
            output_schema: self.agent.output_schema().json_schema(),
            settings: self
                .agent
                .model_settings()
                .resolve(self.config.model_settings.as_ref()),
            conversation_id: self.state.conversation_id.clone(),
            previous_response_id: self.state.previous_response_id.clone(),
        }
    }

    fn find_handoff(&self, name: &str) -> Result<Handoff<C>, RunError> {
        self.agent
            .find_handoff(name)
            .cloned()
            .ok_or_else(|| RunError::UnknownHandoffTarget {
                agent: self.agent.name().to_string(),
                target: name.to_string(),
            })
    }

    fn append(&mut self, item: RunItem) {
        self.projector.item(&item);
        self.state.append(item);
    }

    fn context_snapshot(&self) -> RunContext<C> {
        RunContext::new(
            Arc::clone(&self.context),
            self.agent.name(),
            self.state.turn_count,
            self.state.usage,
        )
    }

    fn check_cancelled(&self) -> Result<(), RunError> {
        if self.config.cancellation.is_cancelled() {
            tracing::info!(agent = %self.agent.name(), "baton.run.cancelled");
            return Err(RunError::Cancelled);
        }
        Ok(())
    }
}

fn rejection_message(kind: ApprovalKind, reason: Option<&str>) -> String {
    let what = match kind {
        ApprovalKind::Tool => "Tool execution was rejected",
        ApprovalKind::Handoff => "Hand-off was rejected",
    };
    match reason {
        Some(reason) => format!("{what}: {reason}"),
        None => format!("{what}."),
    }
}
