//! Agent descriptors.

use std::fmt;
use std::sync::Arc;

use baton_guardrail::{InputGuardrail, OutputGuardrail};
use baton_tool::{Tool, ToolDyn, ToolOptions, ToolRegistry};
use baton_types::{JsonOutput, ModelSettings, OutputSchema, PlainText, RunContext};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handoff::Handoff;
use crate::hooks::RunHooks;

/// Where an agent's system instructions come from.
pub enum Instructions<C> {
    /// A fixed string.
    Static(String),
    /// Computed from the run context before every model call.
    Dynamic(Arc<dyn Fn(&RunContext<C>) -> String + Send + Sync>),
}

impl<C> Instructions<C> {
    /// Produce the instruction text for this turn.
    pub fn resolve(&self, ctx: &RunContext<C>) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(ctx),
        }
    }
}

impl<C> Clone for Instructions<C> {
    fn clone(&self) -> Self {
        match self {
            Instructions::Static(text) => Instructions::Static(text.clone()),
            Instructions::Dynamic(f) => Instructions::Dynamic(Arc::clone(f)),
        }
    }
}

/// When tool results end the run instead of going back to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolUseBehavior {
    /// Send tool results back to the model.
    #[default]
    RunLlmAgain,
    /// The first tool output of a turn is the final output.
    StopOnFirstTool,
    /// The output of the first listed tool called in a turn is the final output.
    StopAtTools(Vec<String>),
}

/// A named bundle of instructions, tools, hand-offs and an output shape.
///
/// Immutable once built. Share it behind an `Arc`; hand-offs point at other
/// agents either directly or by name.
pub struct Agent<C = ()> {
    name: String,
    handoff_description: Option<String>,
    instructions: Option<Instructions<C>>,
    model: Option<String>,
    model_settings: ModelSettings,
    tools: ToolRegistry<C>,
    handoffs: Vec<Handoff<C>>,
    output_schema: Arc<dyn OutputSchema>,
    tool_use_behavior: ToolUseBehavior,
    input_guardrails: Vec<InputGuardrail<C>>,
    output_guardrails: Vec<OutputGuardrail<C>>,
    hooks: Option<Arc<dyn RunHooks<C>>>,
}

impl<C: Send + Sync + 'static> Agent<C> {
    /// Start building an agent.
    pub fn builder(name: impl Into<String>) -> AgentBuilder<C> {
        AgentBuilder {
            agent: Agent {
                name: name.into(),
                handoff_description: None,
                instructions: None,
                model: None,
                model_settings: ModelSettings::default(),
                tools: ToolRegistry::new(),
                handoffs: Vec::new(),
                output_schema: Arc::new(PlainText),
                tool_use_behavior: ToolUseBehavior::default(),
                input_guardrails: Vec::new(),
                output_guardrails: Vec::new(),
                hooks: None,
            },
        }
    }
}

impl<C: Send + Sync> Agent<C> {
    /// The agent's name. Unique within a hand-off graph.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description shown to other agents that can hand off here.
    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    /// Instruction source.
    pub fn instructions(&self) -> Option<&Instructions<C>> {
        self.instructions.as_ref()
    }

    /// Model name override.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Default model settings.
    pub fn model_settings(&self) -> &ModelSettings {
        &self.model_settings
    }

    /// Declared tools.
    pub fn tools(&self) -> &ToolRegistry<C> {
        &self.tools
    }

    /// Declared hand-offs.
    pub fn handoffs(&self) -> &[Handoff<C>] {
        &self.handoffs
    }

    /// The hand-off exposed under `tool_name`.
    pub fn find_handoff(&self, tool_name: &str) -> Option<&Handoff<C>> {
        self.handoffs.iter().find(|h| h.tool_name() == tool_name)
    }

    /// Declared output shape.
    pub fn output_schema(&self) -> &Arc<dyn OutputSchema> {
        &self.output_schema
    }

    /// What happens after tools run.
    pub fn tool_use_behavior(&self) -> &ToolUseBehavior {
        &self.tool_use_behavior
    }

    /// Guardrails over the run input (used when this agent starts a run).
    pub fn input_guardrails(&self) -> &[InputGuardrail<C>] {
        &self.input_guardrails
    }

    /// Guardrails over this agent's final output.
    pub fn output_guardrails(&self) -> &[OutputGuardrail<C>] {
        &self.output_guardrails
    }

    /// Agent-scoped lifecycle listener.
    pub fn hooks(&self) -> Option<&Arc<dyn RunHooks<C>>> {
        self.hooks.as_ref()
    }
}

impl<C> fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tools.len())
            .field("handoffs", &self.handoffs.len())
            .field("output", &self.output_schema.name())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Agent`].
pub struct AgentBuilder<C> {
    agent: Agent<C>,
}

impl<C: Send + Sync + 'static> AgentBuilder<C> {
    /// Fixed system instructions.
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.agent.instructions = Some(Instructions::Static(text.into()));
        self
    }

    /// Instructions computed from the run context each turn.
    pub fn dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext<C>) -> String + Send + Sync + 'static,
    {
        self.agent.instructions = Some(Instructions::Dynamic(Arc::new(f)));
        self
    }

    /// Description other agents see for a hand-off to this one.
    pub fn handoff_description(mut self, text: impl Into<String>) -> Self {
        self.agent.handoff_description = Some(text.into());
        self
    }

    /// Model name passed to the backend.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = Some(model.into());
        self
    }

    /// Default model settings.
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.agent.model_settings = settings;
        self
    }

    /// Add a tool with default options.
    pub fn tool<T: Tool<C> + 'static>(mut self, tool: T) -> Self {
        self.agent.tools.register(tool);
        self
    }

    /// Add a tool with explicit approval and error options.
    pub fn tool_with<T: Tool<C> + 'static>(mut self, tool: T, options: ToolOptions<C>) -> Self {
        self.agent.tools.register_with(tool, options);
        self
    }

    /// Add a pre-erased tool.
    pub fn tool_dyn(mut self, tool: Arc<dyn ToolDyn<C>>, options: ToolOptions<C>) -> Self {
        self.agent.tools.register_dyn(tool, options);
        self
    }

    /// Add a configured hand-off.
    pub fn handoff(mut self, handoff: Handoff<C>) -> Self {
        self.agent.handoffs.push(handoff);
        self
    }

    /// Add a default hand-off to `target`.
    pub fn handoff_to(self, target: &Arc<Agent<C>>) -> Self {
        self.handoff(Handoff::to(target))
    }

    /// Require structured output of type `T`.
    pub fn output_type<T>(mut self) -> Self
    where
        T: DeserializeOwned + Serialize + JsonSchema + 'static,
    {
        self.agent.output_schema = Arc::new(JsonOutput::<T>::new());
        self
    }

    /// Use a custom output shape.
    pub fn output_schema(mut self, schema: Arc<dyn OutputSchema>) -> Self {
        self.agent.output_schema = schema;
        self
    }

    /// Set the tool-use behavior.
    pub fn tool_use_behavior(mut self, behavior: ToolUseBehavior) -> Self {
        self.agent.tool_use_behavior = behavior;
        self
    }

    /// Add an input guardrail.
    pub fn input_guardrail(mut self, guardrail: InputGuardrail<C>) -> Self {
        self.agent.input_guardrails.push(guardrail);
        self
    }

    /// Add an output guardrail.
    pub fn output_guardrail(mut self, guardrail: OutputGuardrail<C>) -> Self {
        self.agent.output_guardrails.push(guardrail);
        self
    }

    /// Attach an agent-scoped lifecycle listener.
    pub fn hooks(mut self, hooks: Arc<dyn RunHooks<C>>) -> Self {
        self.agent.hooks = Some(hooks);
        self
    }

    /// Finish building.
    pub fn build(self) -> Agent<C> {
        for handoff in &self.agent.handoffs {
            if self.agent.tools.get(handoff.tool_name()).is_some() {
                tracing::warn!(
                    agent = %self.agent.name,
                    name = %handoff.tool_name(),
                    "baton.agent.handoff_shadows_tool"
                );
            }
        }
        self.agent
    }

    /// Finish building and wrap in an `Arc`.
    pub fn build_arc(self) -> Arc<Agent<C>> {
        Arc::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::Usage;

    #[derive(serde::Deserialize, Serialize, JsonSchema)]
    struct Verdict {
        approved: bool,
    }

    #[test]
    fn defaults_to_plain_text() {
        let agent = Agent::<()>::builder("helper").build();
        assert!(agent.output_schema().is_plain_text());
        assert_eq!(agent.tool_use_behavior(), &ToolUseBehavior::RunLlmAgain);
        assert!(agent.instructions().is_none());
    }

    #[test]
    fn output_type_sets_schema() {
        let agent = Agent::<()>::builder("judge").output_type::<Verdict>().build();
        assert_eq!(agent.output_schema().name(), "Verdict");
        assert!(agent.output_schema().json_schema().is_some());
    }

    #[test]
    fn dynamic_instructions_read_context() {
        let agent = Agent::<String>::builder("greeter")
            .dynamic_instructions(|ctx| format!("Greet {}.", ctx.context()))
            .build();
        let ctx = RunContext::new(Arc::new("Ada".to_string()), "greeter", 1, Usage::default());
        let text = agent.instructions().unwrap().resolve(&ctx);
        assert_eq!(text, "Greet Ada.");
    }

    #[test]
    fn handoff_lookup_by_tool_name() {
        let billing = Agent::<()>::builder("Billing Desk").build_arc();
        let triage = Agent::builder("triage").handoff_to(&billing).build();
        assert!(triage.find_handoff("transfer_to_billing_desk").is_some());
        assert!(triage.find_handoff("transfer_to_sales").is_none());
    }
}
