//! Per-run configuration.

use std::fmt;
use std::sync::Arc;

use baton_guardrail::{InputGuardrail, OutputGuardrail};
use baton_types::{ModelSettings, RunItem};
use tokio_util::sync::CancellationToken;

use crate::hooks::RunHooks;
use crate::session::Session;

/// Turn budget used when none is configured.
pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Options for one run. Everything here applies on top of the agent's own
/// declarations.
pub struct RunConfig<C> {
    /// Model calls allowed before the run fails with `MaxTurnsExceeded`.
    pub max_turns: u32,
    /// Overrides applied onto each agent's model settings.
    pub model_settings: Option<ModelSettings>,
    /// Overrides each agent's model name.
    pub model: Option<String>,
    /// Run-level input guardrails, evaluated with the starting agent's own.
    pub input_guardrails: Vec<InputGuardrail<C>>,
    /// Run-level output guardrails, evaluated with the final agent's own.
    pub output_guardrails: Vec<OutputGuardrail<C>>,
    /// Run-level lifecycle listener.
    pub hooks: Option<Arc<dyn RunHooks<C>>>,
    /// Conversation memory.
    pub session: Option<Arc<dyn Session>>,
    /// Backend-side conversation identifier.
    pub conversation_id: Option<String>,
    /// Backend-side previous response identifier.
    pub previous_response_id: Option<String>,
    /// Label recorded on the run span.
    pub workflow_name: String,
    /// In streamed runs, re-check output guardrails every this many
    /// characters of assistant text. `None` checks only the final output;
    /// `Some(0)` behaves like `Some(1)`.
    pub streaming_guardrail_chars: Option<usize>,
    /// Aborts the run at the next suspension point when cancelled.
    pub cancellation: CancellationToken,
}

impl<C> RunConfig<C> {
    /// Default configuration.
    pub fn new() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            model_settings: None,
            model: None,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            hooks: None,
            session: None,
            conversation_id: None,
            previous_response_id: None,
            workflow_name: "Agent workflow".to_string(),
            streaming_guardrail_chars: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the turn budget.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Override model settings for every agent.
    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }

    /// Override the model name for every agent.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a run-level input guardrail.
    pub fn with_input_guardrail(mut self, guardrail: InputGuardrail<C>) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    /// Add a run-level output guardrail.
    pub fn with_output_guardrail(mut self, guardrail: OutputGuardrail<C>) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    /// Attach a run-level lifecycle listener.
    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks<C>>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Use conversation memory.
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Set the backend-side conversation identifier.
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Set the backend-side previous response identifier.
    pub fn with_previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    /// Label the run span.
    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = name.into();
        self
    }

    /// Check output guardrails incrementally while streaming.
    pub fn with_streaming_guardrail_chars(mut self, chars: usize) -> Self {
        self.streaming_guardrail_chars = Some(chars.max(1));
        self
    }

    /// Use an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

impl<C> Default for RunConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RunConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_turns", &self.max_turns)
            .field("model", &self.model)
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("session", &self.session.as_ref().map(|s| s.session_id().to_string()))
            .field("workflow_name", &self.workflow_name)
            .finish_non_exhaustive()
    }
}

/// What a fresh run starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInput(pub Vec<RunItem>);

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        RunInput(vec![RunItem::user(text)])
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        RunInput(vec![RunItem::user(text)])
    }
}

impl From<Vec<RunItem>> for RunInput {
    fn from(items: Vec<RunItem>) -> Self {
        RunInput(items)
    }
}

impl From<RunItem> for RunInput {
    fn from(item: RunItem) -> Self {
        RunInput(vec![item])
    }
}
