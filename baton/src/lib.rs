#![deny(missing_docs)]
//! # baton — umbrella crate
//!
//! A single import surface for the baton engine. Re-exports the member
//! crates behind feature flags, plus a `prelude` for the common path:
//!
//! ```ignore
//! use baton::prelude::*;
//!
//! let agent = Agent::<()>::builder("assistant")
//!     .instructions("Answer briefly.")
//!     .build_arc();
//! let result = Runner::new(my_backend)
//!     .run(&agent, "hello", (), RunConfig::default())
//!     .await?;
//! println!("{:?}", result.final_output_text());
//! ```

#[cfg(feature = "core")]
pub use baton_guardrail;
#[cfg(feature = "runner")]
pub use baton_runner;
#[cfg(feature = "core")]
pub use baton_tool;
#[cfg(feature = "core")]
pub use baton_types;

/// Happy-path imports for building and running agents.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use baton_types::{
        JsonOutput, Model, ModelError, ModelRequest, ModelResponse, ModelSettings,
        ModelStreamEvent, OutputSchema, PlainText, RunContext, RunItem, ToolChoice, Usage,
    };

    #[cfg(feature = "core")]
    pub use baton_tool::{Tool, ToolError, ToolOptions, ToolRegistry, function_tool};

    #[cfg(feature = "core")]
    pub use baton_guardrail::{
        GuardrailError, GuardrailFunctionOutput, InputGuardrail, OutputGuardrail,
    };

    #[cfg(feature = "runner")]
    pub use baton_runner::{
        Agent, ApprovalDecision, Handoff, MemorySession, RunConfig, RunError, RunResult,
        RunState, RunStreamEvent, Runner, Session, StreamedRun, ToolUseBehavior, filters,
    };
}
