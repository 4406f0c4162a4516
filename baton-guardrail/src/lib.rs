#![deny(missing_docs)]
//! Guardrail engine for baton.
//!
//! Named predicates over a run's input ([`InputGuardrail`]) or its
//! candidate final output ([`OutputGuardrail`]). Sets run concurrently and
//! settle to a single verdict in declaration order.

pub mod guardrail;

pub use guardrail::*;
