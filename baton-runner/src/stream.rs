//! Streamed runs: lifecycle events projected from a running turn loop.

use std::pin::Pin;
use std::task::{Context, Poll};

use baton_types::{ModelStreamEvent, RunItem};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::result::RunResult;

/// Which kind of run item an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunItemEventName {
    /// The model produced a message.
    MessageOutputCreated,
    /// The model called a tool.
    ToolCalled,
    /// A tool output was recorded.
    ToolOutput,
    /// The model asked for a hand-off.
    HandoffRequested,
    /// A hand-off completed.
    HandoffOccurred,
    /// The model produced reasoning.
    ReasoningItemCreated,
    /// A call is waiting for approval.
    ToolApprovalRequested,
}

impl RunItemEventName {
    /// The event name for an appended item.
    pub fn for_item(item: &RunItem) -> Self {
        match item {
            RunItem::Message(_) => RunItemEventName::MessageOutputCreated,
            RunItem::ToolCall(_) => RunItemEventName::ToolCalled,
            RunItem::ToolCallOutput(_) => RunItemEventName::ToolOutput,
            RunItem::HandoffCall(_) => RunItemEventName::HandoffRequested,
            RunItem::HandoffOutput(_) => RunItemEventName::HandoffOccurred,
            RunItem::Reasoning(_) => RunItemEventName::ReasoningItemCreated,
            RunItem::ApprovalRequest(_) => RunItemEventName::ToolApprovalRequested,
        }
    }
}

/// One event of a streamed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunStreamEvent {
    /// A backend event, passed through unchanged.
    RawModelEvent {
        /// The backend event.
        event: ModelStreamEvent,
    },
    /// A different agent took control (or the run started).
    AgentUpdated {
        /// Name of the agent now in control.
        agent: String,
    },
    /// A structurally complete item was appended to history.
    RunItem {
        /// What kind of item.
        name: RunItemEventName,
        /// The item.
        item: RunItem,
    },
}

/// Pushes projected events to the consumer of a streamed run.
///
/// A blocking run uses a projector with no sink; every emit is a no-op.
#[derive(Debug, Default)]
pub(crate) struct StreamProjector {
    sink: Option<mpsc::UnboundedSender<RunStreamEvent>>,
}

impl StreamProjector {
    pub(crate) fn new(sink: Option<mpsc::UnboundedSender<RunStreamEvent>>) -> Self {
        Self { sink }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.sink.is_some()
    }

    fn emit(&self, event: RunStreamEvent) {
        if let Some(sink) = &self.sink {
            // The consumer may have stopped listening; the run continues.
            let _ = sink.send(event);
        }
    }

    pub(crate) fn raw(&self, event: &ModelStreamEvent) {
        if self.is_streaming() {
            self.emit(RunStreamEvent::RawModelEvent {
                event: event.clone(),
            });
        }
    }

    pub(crate) fn agent_updated(&self, agent: &str) {
        self.emit(RunStreamEvent::AgentUpdated {
            agent: agent.to_string(),
        });
    }

    pub(crate) fn item(&self, item: &RunItem) {
        if self.is_streaming() {
            self.emit(RunStreamEvent::RunItem {
                name: RunItemEventName::for_item(item),
                item: item.clone(),
            });
        }
    }
}

/// Accumulates streamed assistant text and reports when another
/// incremental guardrail check is due.
#[derive(Debug)]
pub(crate) struct TextAccumulator {
    text: String,
    cadence: usize,
    next_check: usize,
}

impl TextAccumulator {
    /// A zero cadence is treated as one: check after every character.
    pub(crate) fn new(cadence: usize) -> Self {
        let cadence = cadence.max(1);
        Self {
            text: String::new(),
            cadence,
            next_check: cadence,
        }
    }

    /// Append `delta`; true when the text crossed the next checkpoint.
    pub(crate) fn push(&mut self, delta: &str) -> bool {
        self.text.push_str(delta);
        let len = self.text.chars().count();
        if len < self.next_check {
            return false;
        }
        while self.next_check <= len {
            self.next_check += self.cadence;
        }
        true
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }
}

/// Handle to a run executing in the background.
///
/// Poll it as a [`Stream`] of [`RunStreamEvent`]s, then await
/// [`StreamedRun::result`]. The run does not wait for the consumer;
/// unread events queue in memory. Dropping the handle cancels the run.
pub struct StreamedRun<C> {
    pub(crate) events: mpsc::UnboundedReceiver<RunStreamEvent>,
    pub(crate) handle: JoinHandle<Result<RunResult<C>, RunError>>,
    pub(crate) cancel: CancellationToken,
}

impl<C> StreamedRun<C> {
    /// The next event, or `None` once the run has finished and the queue is drained.
    pub async fn next_event(&mut self) -> Option<RunStreamEvent> {
        self.events.recv().await
    }

    /// Abort the run at its next suspension point.
    ///
    /// Tool calls already dispatched are not undone; their outputs are discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish. Events not yet read are discarded.
    pub async fn result(mut self) -> Result<RunResult<C>, RunError> {
        self.events.close();
        (&mut self.handle)
            .await
            .map_err(|e| RunError::Task(e.to_string()))?
    }
}

impl<C> Drop for StreamedRun<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<C> Stream for StreamedRun<C> {
    type Item = RunStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_names_cover_every_kind() {
        assert_eq!(
            RunItemEventName::for_item(&RunItem::assistant("hi")),
            RunItemEventName::MessageOutputCreated
        );
        assert_eq!(
            RunItemEventName::for_item(&RunItem::tool_output("c1", "ok", false)),
            RunItemEventName::ToolOutput
        );
    }

    #[test]
    fn accumulator_fires_once_per_cadence_window() {
        let mut acc = TextAccumulator::new(5);
        assert!(!acc.push("abc"));
        assert!(acc.push("de"));
        assert!(!acc.push("f"));
        assert!(acc.push("ghijklmnop"));
        assert!(!acc.push("q"));
        assert_eq!(acc.text(), "abcdefghijklmnopq");
    }

    #[test]
    fn zero_cadence_checks_every_push() {
        let mut acc = TextAccumulator::new(0);
        assert!(acc.push("a"));
        assert!(acc.push("bc"));
        assert!(!acc.push(""));
        assert_eq!(acc.text(), "abc");
    }

    #[tokio::test]
    async fn projector_without_sink_is_silent() {
        let projector = StreamProjector::new(None);
        projector.agent_updated("a");
        projector.item(&RunItem::assistant("x"));
        assert!(!projector.is_streaming());
    }

    #[tokio::test]
    async fn projector_forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let projector = StreamProjector::new(Some(tx));
        projector.agent_updated("a");
        projector.item(&RunItem::assistant("x"));
        drop(projector);
        assert_eq!(
            rx.recv().await,
            Some(RunStreamEvent::AgentUpdated { agent: "a".into() })
        );
        assert!(matches!(
            rx.recv().await,
            Some(RunStreamEvent::RunItem {
                name: RunItemEventName::MessageOutputCreated,
                ..
            })
        ));
        assert_eq!(rx.recv().await, None);
    }
}
