#![deny(missing_docs)]
//! The turn-execution engine for baton.
//!
//! A [`Runner`] drives an [`Agent`] against a [`baton_types::Model`] one turn
//! at a time: it calls the model, executes tools (concurrently, or after
//! human approval), performs hand-offs between agents and enforces input and
//! output guardrails until the agent produces a validated final output.
//!
//! Runs that stop for approval return a [`RunState`] that serializes to
//! plain JSON and can be resumed in another process.

pub mod agent;
pub mod config;
pub mod error;
pub mod handoff;
pub mod hooks;
pub mod result;
pub mod runner;
pub mod session;
pub mod state;
pub mod stream;
mod tool_exec;

// Re-exports
pub use agent::{Agent, AgentBuilder, Instructions, ToolUseBehavior};
pub use config::{DEFAULT_MAX_TURNS, RunConfig, RunInput};
pub use error::{HandoffError, RunError, SessionError, StateError};
pub use handoff::{
    AgentRegistry, Handoff, HandoffInputData, HandoffInputFilter, HandoffTarget,
    default_tool_name, filters,
};
pub use hooks::{RunHooks, TracingHooks};
pub use result::RunResult;
pub use runner::Runner;
pub use session::{MemorySession, MemorySessionStore, Session};
pub use state::{ApprovalDecision, Interruption, RUN_STATE_VERSION, RunState};
pub use stream::{RunItemEventName, RunStreamEvent, StreamedRun};
