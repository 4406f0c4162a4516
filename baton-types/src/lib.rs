#![deny(missing_docs)]
//! Shared vocabulary for baton.
//!
//! Provides the [`RunItem`] conversation vocabulary, the schema adapter
//! ([`OutputSchema`], [`parse_arguments`]), usage counters, the
//! [`RunContext`] threaded through a run, and the [`Model`] backend
//! contract that the runner drives.

pub mod context;
pub mod item;
pub mod model;
pub mod schema;
pub mod usage;

// Re-exports
pub use context::RunContext;
pub use item::*;
pub use model::{
    Model, ModelError, ModelRequest, ModelResponse, ModelSettings, ModelStream, ModelStreamEvent,
    ToolChoice, ToolSpec, replay_response,
};
pub use schema::{
    JsonOutput, OutputSchema, PlainText, ValidationError, from_value, parse_arguments, parse_json,
    schema_for,
};
pub use usage::Usage;
