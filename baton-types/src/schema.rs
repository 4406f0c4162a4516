//! Schema adapter: validate raw model text against a declared shape.
//!
//! Validation is strict. Values are deserialized into the declared Rust
//! type, so `{"x": "yes"}` is rejected for `struct { x: bool }` rather than
//! coerced.

use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use thiserror::Error;

/// Why a value did not match its declared shape.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The raw text was not JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The JSON did not match the declared shape.
    #[error("value does not match `{schema}`: {message}")]
    SchemaMismatch {
        /// Name of the expected shape.
        schema: String,
        /// Deserializer diagnostic.
        message: String,
    },
}

/// A declared output shape for an agent's final output.
pub trait OutputSchema: Send + Sync {
    /// Human-readable name of the shape.
    fn name(&self) -> &str;

    /// Whether this is free text (no structured output requested).
    fn is_plain_text(&self) -> bool {
        false
    }

    /// JSON Schema sent to the model backend, `None` for free text.
    fn json_schema(&self) -> Option<serde_json::Value>;

    /// Validate raw model text, returning the normalized value.
    fn validate(&self, raw: &str) -> Result<serde_json::Value, ValidationError>;
}

/// Free-text output. Accepts anything and returns it as a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainText;

impl OutputSchema for PlainText {
    fn name(&self) -> &str {
        "text"
    }

    fn is_plain_text(&self) -> bool {
        true
    }

    fn json_schema(&self) -> Option<serde_json::Value> {
        None
    }

    fn validate(&self, raw: &str) -> Result<serde_json::Value, ValidationError> {
        Ok(serde_json::Value::String(raw.to_string()))
    }
}

/// Structured output backed by a Rust type.
pub struct JsonOutput<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema> JsonOutput<T> {
    /// Output shape named after `T`.
    pub fn new() -> Self {
        Self {
            name: T::schema_name(),
            _marker: PhantomData,
        }
    }
}

impl<T: JsonSchema> Default for JsonOutput<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OutputSchema for JsonOutput<T>
where
    T: DeserializeOwned + Serialize + JsonSchema,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn json_schema(&self) -> Option<serde_json::Value> {
        Some(schema_for::<T>())
    }

    fn validate(&self, raw: &str) -> Result<serde_json::Value, ValidationError> {
        let typed: T = parse_arguments(raw)?;
        serde_json::to_value(&typed).map_err(|e| ValidationError::SchemaMismatch {
            schema: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// JSON Schema for `T` as a plain value.
pub fn schema_for<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(serde_json::Value::Null)
}

/// Parse raw JSON text strictly into `T`.
///
/// Empty input is treated as `{}` so argument-less tools accept calls
/// whose argument text is blank.
pub fn parse_arguments<T>(raw: &str) -> Result<T, ValidationError>
where
    T: DeserializeOwned + JsonSchema,
{
    let value = parse_json(raw)?;
    from_value(value)
}

/// Deserialize an already-parsed value strictly into `T`.
pub fn from_value<T>(value: serde_json::Value) -> Result<T, ValidationError>
where
    T: DeserializeOwned + JsonSchema,
{
    serde_json::from_value(value).map_err(|e| ValidationError::SchemaMismatch {
        schema: T::schema_name(),
        message: e.to_string(),
    })
}

/// Parse raw text as JSON, treating blank input as an empty object.
pub fn parse_json(raw: &str) -> Result<serde_json::Value, ValidationError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ValidationError::InvalidJson(e.to_string()))
}
