//! Model backend contract.
//!
//! The [`Model`] trait uses RPITIT and is intentionally NOT object-safe.
//! The runner is generic over `M: Model`; concrete backends (chat
//! completions, stateful responses APIs, test doubles) implement it.

use crate::item::RunItem;
use crate::usage::Usage;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from model backends.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ModelError {
    /// HTTP or network request failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Backend rate-limited the request.
    #[error("rate limited")]
    RateLimited,

    /// Could not interpret the backend's response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ModelError {
    /// Whether retrying this request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::RateLimited | ModelError::RequestFailed(_))
    }
}

/// How the model should pick tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    Auto,
    /// The model must call some tool.
    Required,
    /// The model must not call tools.
    None,
    /// The model must call the named tool.
    Named(String),
}

/// Sampling and tool settings for a model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum output tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Tool selection policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Whether the model may issue several tool calls per turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ModelSettings {
    /// Overlay `overrides` onto these settings. Set fields in `overrides` win.
    pub fn resolve(&self, overrides: Option<&ModelSettings>) -> ModelSettings {
        let Some(o) = overrides else {
            return self.clone();
        };
        ModelSettings {
            temperature: o.temperature.or(self.temperature),
            top_p: o.top_p.or(self.top_p),
            max_tokens: o.max_tokens.or(self.max_tokens),
            tool_choice: o.tool_choice.clone().or_else(|| self.tool_choice.clone()),
            parallel_tool_calls: o.parallel_tool_calls.or(self.parallel_tool_calls),
        }
    }
}

/// A callable declared to the model (tool or hand-off).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model calls.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: serde_json::Value,
}

/// Request sent to a model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model to use (None = backend default).
    pub model: Option<String>,
    /// Resolved system instructions.
    pub instructions: Option<String>,
    /// Ordered, model-visible input items.
    pub input: Vec<RunItem>,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
    /// Hand-offs the model may call.
    pub handoffs: Vec<ToolSpec>,
    /// JSON Schema of the expected final output (None = free text).
    pub output_schema: Option<serde_json::Value>,
    /// Sampling and tool settings.
    pub settings: ModelSettings,
    /// Backend-side conversation identifier.
    pub conversation_id: Option<String>,
    /// Previous backend response, for stateful protocols.
    pub previous_response_id: Option<String>,
}

/// Response from a model backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Ordered output items.
    pub output: Vec<RunItem>,
    /// Usage for this call.
    pub usage: Usage,
    /// Backend response identifier, if the protocol has one.
    pub response_id: Option<String>,
}

/// Incremental events from a streaming model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelStreamEvent {
    /// A chunk of assistant text.
    TextDelta {
        /// The text chunk.
        delta: String,
    },
    /// A chunk of reasoning text.
    ReasoningDelta {
        /// The reasoning chunk.
        delta: String,
    },
    /// The model started a function call.
    ToolCallStarted {
        /// Call identifier.
        call_id: String,
        /// Function name.
        name: String,
    },
    /// A chunk of function call arguments.
    ToolCallArgumentsDelta {
        /// Call identifier.
        call_id: String,
        /// Argument text chunk.
        delta: String,
    },
    /// Completion marker carrying the full response.
    Completed {
        /// Same item set a non-streaming call would have returned.
        response: ModelResponse,
    },
}

/// A stream of model events.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelStreamEvent, ModelError>> + Send>>;

/// Model backend interface.
pub trait Model: Send + Sync {
    /// Send a request and wait for the full response.
    fn get_response(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send;

    /// Send a request and receive incremental events.
    ///
    /// The default implementation replays the non-streaming response.
    fn stream_response(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<ModelStream, ModelError>> + Send {
        async move {
            let response = self.get_response(request).await?;
            Ok(replay_response(response))
        }
    }
}

/// Turn a complete response into the events a streaming backend would emit.
pub fn replay_response(response: ModelResponse) -> ModelStream {
    let mut events = Vec::new();
    for item in &response.output {
        match item {
            RunItem::Message(message) => events.push(ModelStreamEvent::TextDelta {
                delta: message.text(),
            }),
            RunItem::Reasoning(reasoning) => events.push(ModelStreamEvent::ReasoningDelta {
                delta: reasoning.text.clone(),
            }),
            RunItem::ToolCall(call) => {
                events.push(ModelStreamEvent::ToolCallStarted {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                });
                events.push(ModelStreamEvent::ToolCallArgumentsDelta {
                    call_id: call.call_id.clone(),
                    delta: call.arguments.clone(),
                });
            }
            RunItem::HandoffCall(call) => {
                events.push(ModelStreamEvent::ToolCallStarted {
                    call_id: call.call_id.clone(),
                    name: call.name.clone(),
                });
                events.push(ModelStreamEvent::ToolCallArgumentsDelta {
                    call_id: call.call_id.clone(),
                    delta: call.arguments.clone(),
                });
            }
            RunItem::ToolCallOutput(_)
            | RunItem::HandoffOutput(_)
            | RunItem::ApprovalRequest(_) => {}
        }
    }
    events.push(ModelStreamEvent::Completed { response });
    Box::pin(futures::stream::iter(events.into_iter().map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Fixed(ModelResponse);

    impl Model for Fixed {
        fn get_response(
            &self,
            _request: ModelRequest,
        ) -> impl Future<Output = Result<ModelResponse, ModelError>> + Send {
            let response = self.0.clone();
            async move { Ok(response) }
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            model: None,
            instructions: None,
            input: vec![RunItem::user("hi")],
            tools: vec![],
            handoffs: vec![],
            output_schema: None,
            settings: ModelSettings::default(),
            conversation_id: None,
            previous_response_id: None,
        }
    }

    #[test]
    fn model_error_retryable() {
        assert!(ModelError::RateLimited.is_retryable());
        assert!(ModelError::RequestFailed("timeout".into()).is_retryable());
        assert!(!ModelError::InvalidResponse("x".into()).is_retryable());
        assert_eq!(ModelError::RateLimited.to_string(), "rate limited");
    }

    #[test]
    fn settings_overrides_win() {
        let base = ModelSettings {
            temperature: Some(0.2),
            max_tokens: Some(100),
            ..Default::default()
        };
        let overrides = ModelSettings {
            temperature: Some(0.9),
            ..Default::default()
        };
        let resolved = base.resolve(Some(&overrides));
        assert_eq!(resolved.temperature, Some(0.9));
        assert_eq!(resolved.max_tokens, Some(100));
        assert_eq!(base.resolve(None), base);
    }

    #[tokio::test]
    async fn default_stream_replays_and_completes() {
        let response = ModelResponse {
            output: vec![
                RunItem::assistant("hello"),
                RunItem::tool_call("c1", "lookup", "{}"),
            ],
            usage: Usage::new(1, 1),
            response_id: Some("r1".into()),
        };
        let model = Fixed(response.clone());
        let events: Vec<_> = model
            .stream_response(request())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            ModelStreamEvent::TextDelta {
                delta: "hello".into()
            }
        );
        assert_eq!(events[3], ModelStreamEvent::Completed { response });
    }
}
