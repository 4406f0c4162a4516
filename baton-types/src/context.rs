//! The context value threaded through a run.

use crate::usage::Usage;
use std::sync::Arc;

/// Snapshot handed to tools, guardrails, hooks and instruction functions.
///
/// `C` is the caller's payload. The engine never inspects it; it is shared
/// by reference across every callback of a run.
pub struct RunContext<C> {
    context: Arc<C>,
    agent: String,
    turn: u32,
    usage: Usage,
}

impl<C> RunContext<C> {
    /// Create a context snapshot.
    pub fn new(context: Arc<C>, agent: impl Into<String>, turn: u32, usage: Usage) -> Self {
        Self {
            context,
            agent: agent.into(),
            turn,
            usage,
        }
    }

    /// The caller's payload.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// A shared handle to the caller's payload.
    pub fn shared(&self) -> Arc<C> {
        Arc::clone(&self.context)
    }

    /// Name of the agent currently in control.
    pub fn agent_name(&self) -> &str {
        &self.agent
    }

    /// Current turn number (1-based, 0 before the first model call).
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Usage accumulated by the run so far.
    pub fn usage(&self) -> &Usage {
        &self.usage
    }
}

impl<C> Clone for RunContext<C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            agent: self.agent.clone(),
            turn: self.turn,
            usage: self.usage,
        }
    }
}

impl<C> std::fmt::Debug for RunContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("agent", &self.agent)
            .field("turn", &self.turn)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}
