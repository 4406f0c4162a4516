//! Tool registry: register tools with their approval and error policies.

use std::collections::HashMap;
use std::sync::Arc;

use baton_types::{RunContext, ToolSpec};

use crate::tool::{Tool, ToolDyn, ToolError};

/// Predicate deciding whether a call needs human approval.
pub type ApprovalPredicate<C> =
    Arc<dyn Fn(&RunContext<C>, &serde_json::Value) -> bool + Send + Sync>;

/// Maps a tool failure to the text the model sees.
pub type ErrorMapper = Arc<dyn Fn(&ToolError) -> String + Send + Sync>;

/// When a tool call must wait for a human decision.
pub enum ApprovalPolicy<C> {
    /// Never ask.
    Never,
    /// Always ask.
    Always,
    /// Ask when the predicate returns `true` for the parsed arguments.
    When(ApprovalPredicate<C>),
}

impl<C> ApprovalPolicy<C> {
    /// Evaluate the policy for one call.
    pub fn requires_approval(&self, ctx: &RunContext<C>, args: &serde_json::Value) -> bool {
        match self {
            ApprovalPolicy::Never => false,
            ApprovalPolicy::Always => true,
            ApprovalPolicy::When(predicate) => predicate(ctx, args),
        }
    }
}

impl<C> Clone for ApprovalPolicy<C> {
    fn clone(&self) -> Self {
        match self {
            ApprovalPolicy::Never => ApprovalPolicy::Never,
            ApprovalPolicy::Always => ApprovalPolicy::Always,
            ApprovalPolicy::When(predicate) => ApprovalPolicy::When(Arc::clone(predicate)),
        }
    }
}

/// What happens when a tool call fails.
#[derive(Clone)]
pub enum ErrorHandling {
    /// Turn the failure into an error output item for the model.
    ReturnToModel(Option<ErrorMapper>),
    /// Abort the run with the error.
    Propagate,
}

impl ErrorHandling {
    /// Output text for a failure, or `None` if the error must propagate.
    pub fn render(&self, err: &ToolError) -> Option<String> {
        match self {
            ErrorHandling::ReturnToModel(Some(mapper)) => Some(mapper(err)),
            ErrorHandling::ReturnToModel(None) => Some(default_error_output(err)),
            ErrorHandling::Propagate => None,
        }
    }
}

/// The text the model sees for a failed call when no mapper is set.
pub fn default_error_output(err: &ToolError) -> String {
    match err {
        ToolError::ModelRetry(guidance) => guidance.clone(),
        other => format!("An error occurred while running the tool. Please try again. Error: {other}"),
    }
}

/// Per-tool policies.
pub struct ToolOptions<C> {
    approval: ApprovalPolicy<C>,
    on_error: ErrorHandling,
}

impl<C> ToolOptions<C> {
    /// No approval, failures returned to the model.
    pub fn new() -> Self {
        Self {
            approval: ApprovalPolicy::Never,
            on_error: ErrorHandling::ReturnToModel(None),
        }
    }

    /// Require approval for every call (or none).
    pub fn needs_approval(mut self, needs: bool) -> Self {
        self.approval = if needs {
            ApprovalPolicy::Always
        } else {
            ApprovalPolicy::Never
        };
        self
    }

    /// Require approval when `predicate` returns `true`.
    pub fn approve_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RunContext<C>, &serde_json::Value) -> bool + Send + Sync + 'static,
    {
        self.approval = ApprovalPolicy::When(Arc::new(predicate));
        self
    }

    /// Render failures for the model with a custom mapper.
    pub fn map_errors<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&ToolError) -> String + Send + Sync + 'static,
    {
        self.on_error = ErrorHandling::ReturnToModel(Some(Arc::new(mapper)));
        self
    }

    /// Abort the run when this tool fails instead of telling the model.
    pub fn propagate_errors(mut self) -> Self {
        self.on_error = ErrorHandling::Propagate;
        self
    }

    /// The approval policy.
    pub fn approval(&self) -> &ApprovalPolicy<C> {
        &self.approval
    }

    /// The failure policy.
    pub fn on_error(&self) -> &ErrorHandling {
        &self.on_error
    }
}

impl<C> Default for ToolOptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ToolOptions<C> {
    fn clone(&self) -> Self {
        Self {
            approval: self.approval.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

/// A tool together with its policies.
pub struct RegisteredTool<C> {
    tool: Arc<dyn ToolDyn<C>>,
    options: ToolOptions<C>,
}

impl<C> RegisteredTool<C> {
    /// The tool's unique name.
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// The callable.
    pub fn tool(&self) -> &Arc<dyn ToolDyn<C>> {
        &self.tool
    }

    /// Approval and error policies.
    pub fn options(&self) -> &ToolOptions<C> {
        &self.options
    }
}

/// Registry of tools in declaration order.
///
/// Tools are stored as type-erased [`ToolDyn`] trait objects. Registering a
/// second tool under an existing name replaces the first.
pub struct ToolRegistry<C> {
    tools: Vec<Arc<RegisteredTool<C>>>,
    index: HashMap<String, usize>,
}

impl<C: Send + Sync + 'static> ToolRegistry<C> {
    /// Register a strongly-typed tool with default options.
    pub fn register<T: Tool<C> + 'static>(&mut self, tool: T) -> &mut Self {
        self.register_dyn(Arc::new(tool), ToolOptions::new())
    }

    /// Register a strongly-typed tool with explicit options.
    pub fn register_with<T: Tool<C> + 'static>(
        &mut self,
        tool: T,
        options: ToolOptions<C>,
    ) -> &mut Self {
        self.register_dyn(Arc::new(tool), options)
    }
}

impl<C> ToolRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a pre-erased tool.
    pub fn register_dyn(&mut self, tool: Arc<dyn ToolDyn<C>>, options: ToolOptions<C>) -> &mut Self {
        let name = tool.name().to_string();
        let entry = Arc::new(RegisteredTool { tool, options });
        match self.index.get(&name) {
            Some(&pos) => {
                tracing::warn!(tool = %name, "baton.tool.replaced");
                self.tools[pos] = entry;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(entry);
            }
        }
        self
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool<C>>> {
        self.index.get(name).map(|&pos| Arc::clone(&self.tools[pos]))
    }

    /// Declarations for all registered tools, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.tool.spec()).collect()
    }

    /// Iterate registered tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredTool<C>>> {
        self.tools.iter()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<C> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for ToolRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            index: self.index.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::function_tool;
    use baton_types::Usage;
    use serde_json::json;

    fn echo(name: &'static str) -> impl Tool<()> + 'static {
        function_tool(name, "Echo arguments", |_ctx: RunContext<()>, args: serde_json::Value| async move {
            Ok::<_, ToolError>(args)
        })
    }

    fn ctx() -> RunContext<()> {
        RunContext::new(Arc::new(()), "agent", 1, Usage::default())
    }

    #[test]
    fn specs_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("b")).register(echo("a")).register(echo("c"));
        let names: Vec<_> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_name_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register(echo("a")).register(echo("b"));
        registry.register_with(echo("a"), ToolOptions::new().needs_approval(true));
        assert_eq!(registry.len(), 2);
        let a = registry.get("a").unwrap();
        assert!(a.options().approval().requires_approval(&ctx(), &json!({})));
        assert_eq!(registry.specs()[0].name, "a");
    }

    #[test]
    fn predicate_sees_arguments() {
        let options: ToolOptions<()> =
            ToolOptions::new().approve_when(|_ctx, args| args["amount"].as_u64() > Some(100));
        assert!(options.approval().requires_approval(&ctx(), &json!({"amount": 500})));
        assert!(!options.approval().requires_approval(&ctx(), &json!({"amount": 5})));
    }

    #[test]
    fn error_handling_renders_or_propagates() {
        let err = ToolError::InvalidInput("nope".into());
        let default = ToolOptions::<()>::new();
        assert!(default.on_error().render(&err).unwrap().contains("invalid input: nope"));

        let mapped = ToolOptions::<()>::new().map_errors(|e| format!("mapped: {e}"));
        assert_eq!(mapped.on_error().render(&err).unwrap(), "mapped: invalid input: nope");

        let strict = ToolOptions::<()>::new().propagate_errors();
        assert!(strict.on_error().render(&err).is_none());
    }

    #[test]
    fn model_retry_guidance_is_passed_through() {
        let err = ToolError::ModelRetry("ask for the city first".into());
        assert_eq!(default_error_output(&err), "ask for the city first");
    }

    #[test]
    fn missing_tool_is_none() {
        let registry = ToolRegistry::<()>::new();
        assert!(registry.get("ghost").is_none());
        assert!(registry.is_empty());
    }
}
