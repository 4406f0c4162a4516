//! Hand-offs: transfer control from one agent to another mid-run.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use baton_types::{RunContext, RunItem, ToolSpec, parse_arguments, parse_json, schema_for};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::agent::Agent;
use crate::error::{HandoffError, RunError};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type OnHandoffFn<C> =
    Arc<dyn Fn(RunContext<C>, Option<serde_json::Value>) -> BoxFuture<Result<(), HandoffError>> + Send + Sync>;
type InputParser = Arc<dyn Fn(&str) -> Result<serde_json::Value, HandoffError> + Send + Sync>;

/// History handed to an input filter.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffInputData {
    /// What the outgoing agent saw before the hand-off turn.
    pub history: Vec<RunItem>,
    /// Items produced in the hand-off turn, including the transfer itself.
    pub new_items: Vec<RunItem>,
}

impl HandoffInputData {
    /// The receiving agent's view: history followed by new items.
    pub fn into_items(self) -> Vec<RunItem> {
        let mut items = self.history;
        items.extend(self.new_items);
        items
    }
}

/// Rewrites the history the receiving agent sees.
pub type HandoffInputFilter = Arc<dyn Fn(HandoffInputData) -> HandoffInputData + Send + Sync>;

/// Ready-made input filters.
pub mod filters {
    use super::HandoffInputData;

    /// Drop all tool traffic (calls, outputs, transfers, approval requests).
    pub fn remove_all_tools(data: HandoffInputData) -> HandoffInputData {
        HandoffInputData {
            history: data
                .history
                .into_iter()
                .filter(|item| !item.is_tool_traffic())
                .collect(),
            new_items: data
                .new_items
                .into_iter()
                .filter(|item| !item.is_tool_traffic())
                .collect(),
        }
    }
}

/// The agent a hand-off transfers to.
pub enum HandoffTarget<C> {
    /// A direct reference.
    Agent(Arc<Agent<C>>),
    /// An agent resolved by name from the run's [`AgentRegistry`].
    Named(String),
}

impl<C: Send + Sync> HandoffTarget<C> {
    /// Name of the target agent.
    pub fn name(&self) -> &str {
        match self {
            HandoffTarget::Agent(agent) => agent.name(),
            HandoffTarget::Named(name) => name,
        }
    }
}

impl<C> Clone for HandoffTarget<C> {
    fn clone(&self) -> Self {
        match self {
            HandoffTarget::Agent(agent) => HandoffTarget::Agent(Arc::clone(agent)),
            HandoffTarget::Named(name) => HandoffTarget::Named(name.clone()),
        }
    }
}

/// A declared transfer, exposed to the model as a tool.
pub struct Handoff<C> {
    target: HandoffTarget<C>,
    tool_name: String,
    tool_description: String,
    input_schema: Option<serde_json::Value>,
    input_parser: Option<InputParser>,
    on_handoff: Option<OnHandoffFn<C>>,
    input_filter: Option<HandoffInputFilter>,
    needs_approval: bool,
}

impl<C: Send + Sync + 'static> Handoff<C> {
    /// Hand off to `agent` with default tool name and description.
    pub fn to(agent: &Arc<Agent<C>>) -> Self {
        let description = default_description(agent.name(), agent.handoff_description());
        Self::with_target(HandoffTarget::Agent(Arc::clone(agent)), description)
    }

    /// Hand off to the agent registered under `name`.
    ///
    /// Use this to close cycles: the target must be reachable from the
    /// starting agent through direct references.
    pub fn to_named(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = default_description(&name, None);
        Self::with_target(HandoffTarget::Named(name), description)
    }

    fn with_target(target: HandoffTarget<C>, tool_description: String) -> Self {
        Self {
            tool_name: default_tool_name(target.name()),
            target,
            tool_description,
            input_schema: None,
            input_parser: None,
            on_handoff: None,
            input_filter: None,
            needs_approval: false,
        }
    }

    /// Override the tool name the model calls.
    pub fn tool_name_override(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    /// Override the tool description.
    pub fn tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = description.into();
        self
    }

    /// Require the model to pass arguments of type `T`.
    pub fn with_input<T>(mut self) -> Self
    where
        T: DeserializeOwned + Serialize + JsonSchema + 'static,
    {
        self.input_schema = Some(schema_for::<T>());
        self.input_parser = Some(Arc::new(|raw: &str| -> Result<serde_json::Value, HandoffError> {
            let typed: T = parse_arguments(raw)?;
            serde_json::to_value(typed).map_err(|e| HandoffError::Other(Box::new(e)))
        }));
        self
    }

    /// Run `callback` when the transfer happens. Failures abort the run.
    pub fn on_handoff<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(RunContext<C>, Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandoffError>> + Send + 'static,
    {
        self.on_handoff = Some(Arc::new(move |ctx, input| Box::pin(callback(ctx, input))));
        self
    }

    /// Rewrite the receiving agent's history.
    pub fn input_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(HandoffInputData) -> HandoffInputData + Send + Sync + 'static,
    {
        self.input_filter = Some(Arc::new(filter));
        self
    }

    /// Require human approval before transferring.
    pub fn needs_approval(mut self, needs: bool) -> Self {
        self.needs_approval = needs;
        self
    }
}

impl<C: Send + Sync> Handoff<C> {
    /// The target.
    pub fn target(&self) -> &HandoffTarget<C> {
        &self.target
    }

    /// Tool name the model calls.
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// History filter, if any.
    pub fn filter(&self) -> Option<&HandoffInputFilter> {
        self.input_filter.as_ref()
    }

    /// Whether a human must approve the transfer.
    pub fn requires_approval(&self) -> bool {
        self.needs_approval
    }

    /// Declaration sent to the model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.tool_name.clone(),
            description: self.tool_description.clone(),
            parameters: self.input_schema.clone().unwrap_or_else(|| {
                serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                })
            }),
        }
    }

    /// Resolve the target, validate the input and fire the callback.
    pub(crate) async fn resolve(
        &self,
        registry: &AgentRegistry<C>,
        ctx: &RunContext<C>,
        arguments: &str,
    ) -> Result<Arc<Agent<C>>, RunError> {
        let target = registry
            .resolve(&self.target)
            .ok_or_else(|| RunError::UnknownAgent(self.target.name().to_string()))?;

        let input = match &self.input_parser {
            Some(parse) => Some(parse(arguments).map_err(|source| self.failure(source))?),
            None => parse_json(arguments).ok(),
        };

        if let Some(callback) = &self.on_handoff {
            callback(ctx.clone(), input)
                .await
                .map_err(|source| self.failure(source))?;
        }
        Ok(target)
    }

    fn failure(&self, source: HandoffError) -> RunError {
        RunError::Handoff {
            handoff: self.tool_name.clone(),
            source,
        }
    }
}

impl<C> Clone for Handoff<C> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            tool_name: self.tool_name.clone(),
            tool_description: self.tool_description.clone(),
            input_schema: self.input_schema.clone(),
            input_parser: self.input_parser.clone(),
            on_handoff: self.on_handoff.clone(),
            input_filter: self.input_filter.clone(),
            needs_approval: self.needs_approval,
        }
    }
}

/// `transfer_to_<snake_case name>`.
pub fn default_tool_name(agent_name: &str) -> String {
    let snake: String = agent_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("transfer_to_{snake}")
}

fn default_description(agent_name: &str, handoff_description: Option<&str>) -> String {
    match handoff_description {
        Some(extra) => {
            format!("Handoff to the {agent_name} agent to handle the request. {extra}")
        }
        None => format!("Handoff to the {agent_name} agent to handle the request."),
    }
}

/// Agents reachable from a starting agent, by name.
pub struct AgentRegistry<C> {
    agents: HashMap<String, Arc<Agent<C>>>,
}

impl<C: Send + Sync> AgentRegistry<C> {
    /// Walk direct hand-off references from `root`.
    pub fn from_root(root: &Arc<Agent<C>>) -> Self {
        let mut registry = Self {
            agents: HashMap::new(),
        };
        let mut stack = vec![Arc::clone(root)];
        while let Some(agent) = stack.pop() {
            if let Some(existing) = registry.agents.get(agent.name()) {
                if !Arc::ptr_eq(existing, &agent) {
                    tracing::warn!(agent = %agent.name(), "baton.registry.duplicate_name");
                }
                continue;
            }
            for handoff in agent.handoffs() {
                if let HandoffTarget::Agent(target) = handoff.target() {
                    stack.push(Arc::clone(target));
                }
            }
            registry.agents.insert(agent.name().to_string(), agent);
        }
        registry
    }

    /// Add an agent that is not reachable by direct reference.
    pub fn register(&mut self, agent: Arc<Agent<C>>) {
        self.agents.insert(agent.name().to_string(), agent);
    }

    /// Look up an agent by name.
    pub fn get(&self, name: &str) -> Option<Arc<Agent<C>>> {
        self.agents.get(name).cloned()
    }

    /// Resolve a hand-off target.
    pub fn resolve(&self, target: &HandoffTarget<C>) -> Option<Arc<Agent<C>>> {
        match target {
            HandoffTarget::Agent(agent) => Some(Arc::clone(agent)),
            HandoffTarget::Named(name) => self.get(name),
        }
    }

    /// Number of known agents.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_types::Usage;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, Serialize, JsonSchema)]
    struct Escalation {
        reason: String,
    }

    fn ctx() -> RunContext<()> {
        RunContext::new(Arc::new(()), "triage", 1, Usage::default())
    }

    #[test]
    fn default_tool_name_is_snake_case() {
        assert_eq!(default_tool_name("Billing Agent"), "transfer_to_billing_agent");
        assert_eq!(default_tool_name("refunds"), "transfer_to_refunds");
    }

    #[test]
    fn registry_walks_graph_and_named_edges_close_cycles() {
        let b = Agent::<()>::builder("b")
            .handoff(Handoff::to_named("a"))
            .build_arc();
        let a = Agent::builder("a").handoff_to(&b).build_arc();
        let registry = AgentRegistry::from_root(&a);
        assert_eq!(registry.len(), 2);
        let back = registry.resolve(b.handoffs()[0].target()).unwrap();
        assert!(Arc::ptr_eq(&back, &a));
    }

    #[tokio::test]
    async fn named_target_outside_graph_is_unknown() {
        let a = Agent::<()>::builder("a")
            .handoff(Handoff::to_named("ghost"))
            .build_arc();
        let registry = AgentRegistry::from_root(&a);
        let err = a.handoffs()[0]
            .resolve(&registry, &ctx(), "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::UnknownAgent(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn typed_input_is_validated_and_passed_to_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let target = Agent::<()>::builder("escalations").build_arc();
        let handoff = Handoff::to(&target)
            .with_input::<Escalation>()
            .on_handoff(move |_ctx, input| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock().unwrap() = input;
                    Ok(())
                }
            });
        let registry = AgentRegistry::from_root(&target);

        let resolved = handoff
            .resolve(&registry, &ctx(), r#"{"reason":"angry customer"}"#)
            .await
            .unwrap();
        assert_eq!(resolved.name(), "escalations");
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(serde_json::json!({"reason": "angry customer"}))
        );

        let err = handoff
            .resolve(&registry, &ctx(), r#"{"why":"?"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Handoff {
                source: HandoffError::InvalidInput(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn callback_failure_is_fatal() {
        let target = Agent::<()>::builder("b").build_arc();
        let handoff = Handoff::to(&target).on_handoff(|_ctx, _input| async {
            Err(HandoffError::Callback("audit log unavailable".into()))
        });
        let registry = AgentRegistry::from_root(&target);
        let err = handoff.resolve(&registry, &ctx(), "{}").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "hand-off `transfer_to_b` failed: hand-off callback failed: audit log unavailable"
        );
    }

    #[test]
    fn remove_all_tools_keeps_messages() {
        let data = HandoffInputData {
            history: vec![
                RunItem::user("hi"),
                RunItem::tool_call("c1", "lookup", "{}"),
                RunItem::tool_output("c1", "42", false),
            ],
            new_items: vec![
                RunItem::assistant("transferring"),
                RunItem::tool_call("c2", "transfer_to_b", "{}"),
            ],
        };
        let filtered = filters::remove_all_tools(data).into_items();
        assert_eq!(
            filtered,
            vec![RunItem::user("hi"), RunItem::assistant("transferring")]
        );
    }

    #[test]
    fn spec_defaults_to_empty_object_schema() {
        let target = Agent::<()>::builder("b").handoff_description("Handles billing.").build_arc();
        let spec = Handoff::to(&target).spec();
        assert_eq!(spec.name, "transfer_to_b");
        assert!(spec.description.ends_with("Handles billing."));
        assert_eq!(spec.parameters["type"], "object");
    }
}
