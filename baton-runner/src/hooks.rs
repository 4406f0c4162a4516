//! Lifecycle listeners.
//!
//! Run-level hooks come from [`crate::RunConfig::hooks`]; agent-level hooks
//! from [`crate::Agent::hooks`]. Both see every event for their scope, run
//! hooks first.

use std::sync::Arc;

use async_trait::async_trait;
use baton_types::{ModelRequest, ModelResponse, RunContext, ToolCallItem};

use crate::agent::Agent;

/// Listener for run lifecycle events. Every method defaults to a no-op.
#[async_trait]
pub trait RunHooks<C: Send + Sync>: Send + Sync {
    /// An agent is about to take its first turn.
    async fn on_agent_start(&self, _ctx: &RunContext<C>, _agent: &Agent<C>) {}

    /// An agent produced the run's final output.
    async fn on_agent_end(
        &self,
        _ctx: &RunContext<C>,
        _agent: &Agent<C>,
        _output: &serde_json::Value,
    ) {
    }

    /// Control moved from one agent to another.
    async fn on_handoff(&self, _ctx: &RunContext<C>, _from: &Agent<C>, _to: &Agent<C>) {}

    /// A tool is about to run.
    async fn on_tool_start(&self, _ctx: &RunContext<C>, _agent: &Agent<C>, _call: &ToolCallItem) {}

    /// A tool finished; `output` is what the model will see.
    async fn on_tool_end(
        &self,
        _ctx: &RunContext<C>,
        _agent: &Agent<C>,
        _call: &ToolCallItem,
        _output: &str,
    ) {
    }

    /// A model call is about to be made.
    async fn on_llm_start(&self, _ctx: &RunContext<C>, _agent: &Agent<C>, _request: &ModelRequest) {}

    /// A model call returned.
    async fn on_llm_end(&self, _ctx: &RunContext<C>, _agent: &Agent<C>, _response: &ModelResponse) {
    }
}

/// Forwards lifecycle events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

#[async_trait]
impl<C: Send + Sync> RunHooks<C> for TracingHooks {
    async fn on_agent_start(&self, ctx: &RunContext<C>, agent: &Agent<C>) {
        tracing::info!(agent = %agent.name(), turn = ctx.turn(), "baton.agent.start");
    }

    async fn on_agent_end(&self, ctx: &RunContext<C>, agent: &Agent<C>, _output: &serde_json::Value) {
        tracing::info!(
            agent = %agent.name(),
            turn = ctx.turn(),
            total_tokens = ctx.usage().total_tokens,
            "baton.agent.end"
        );
    }

    async fn on_handoff(&self, _ctx: &RunContext<C>, from: &Agent<C>, to: &Agent<C>) {
        tracing::info!(from = %from.name(), to = %to.name(), "baton.handoff");
    }

    async fn on_tool_start(&self, _ctx: &RunContext<C>, agent: &Agent<C>, call: &ToolCallItem) {
        tracing::debug!(agent = %agent.name(), tool = %call.name, call_id = %call.call_id, "baton.tool.start");
    }

    async fn on_tool_end(
        &self,
        _ctx: &RunContext<C>,
        agent: &Agent<C>,
        call: &ToolCallItem,
        output: &str,
    ) {
        tracing::debug!(
            agent = %agent.name(),
            tool = %call.name,
            call_id = %call.call_id,
            output_len = output.len(),
            "baton.tool.end"
        );
    }

    async fn on_llm_start(&self, ctx: &RunContext<C>, agent: &Agent<C>, request: &ModelRequest) {
        tracing::debug!(
            agent = %agent.name(),
            turn = ctx.turn(),
            items = request.input.len(),
            tools = request.tools.len(),
            "baton.llm.start"
        );
    }

    async fn on_llm_end(&self, _ctx: &RunContext<C>, agent: &Agent<C>, response: &ModelResponse) {
        tracing::debug!(
            agent = %agent.name(),
            items = response.output.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "baton.llm.end"
        );
    }
}

/// Run hooks plus the current agent's hooks, dispatched in that order.
pub(crate) struct HookSet<'a, C: Send + Sync> {
    run: Option<&'a Arc<dyn RunHooks<C>>>,
    agent: Option<&'a Arc<dyn RunHooks<C>>>,
}

impl<'a, C: Send + Sync> HookSet<'a, C> {
    pub(crate) fn new(run: Option<&'a Arc<dyn RunHooks<C>>>, agent: &'a Agent<C>) -> Self {
        Self {
            run,
            agent: agent.hooks(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &'a Arc<dyn RunHooks<C>>> + use<'a, C> {
        self.run.into_iter().chain(self.agent)
    }

    pub(crate) async fn agent_start(&self, ctx: &RunContext<C>, agent: &Agent<C>) {
        for hooks in self.iter() {
            hooks.on_agent_start(ctx, agent).await;
        }
    }

    pub(crate) async fn agent_end(
        &self,
        ctx: &RunContext<C>,
        agent: &Agent<C>,
        output: &serde_json::Value,
    ) {
        for hooks in self.iter() {
            hooks.on_agent_end(ctx, agent, output).await;
        }
    }

    pub(crate) async fn handoff(&self, ctx: &RunContext<C>, from: &Agent<C>, to: &Agent<C>) {
        for hooks in self.iter() {
            hooks.on_handoff(ctx, from, to).await;
        }
    }

    pub(crate) async fn tool_start(&self, ctx: &RunContext<C>, agent: &Agent<C>, call: &ToolCallItem) {
        for hooks in self.iter() {
            hooks.on_tool_start(ctx, agent, call).await;
        }
    }

    pub(crate) async fn tool_end(
        &self,
        ctx: &RunContext<C>,
        agent: &Agent<C>,
        call: &ToolCallItem,
        output: &str,
    ) {
        for hooks in self.iter() {
            hooks.on_tool_end(ctx, agent, call, output).await;
        }
    }

    pub(crate) async fn llm_start(&self, ctx: &RunContext<C>, agent: &Agent<C>, request: &ModelRequest) {
        for hooks in self.iter() {
            hooks.on_llm_start(ctx, agent, request).await;
        }
    }

    pub(crate) async fn llm_end(&self, ctx: &RunContext<C>, agent: &Agent<C>, response: &ModelResponse) {
        for hooks in self.iter() {
            hooks.on_llm_end(ctx, agent, response).await;
        }
    }
}
