#![deny(missing_docs)]
//! Tools for baton agents.
//!
//! Implement the typed [`Tool`] trait (or wrap a closure with
//! [`function_tool`]) and register it in a [`ToolRegistry`] together with
//! its [`ToolOptions`]: an approval policy and a failure policy.

pub mod registry;
pub mod tool;

pub use registry::*;
pub use tool::*;
