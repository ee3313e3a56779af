//! Typed access to raw tool call arguments.

use crate::error::ChatError;

/// Parsed tool call arguments.
///
/// The model streams arguments as a serialized JSON blob; an empty blob is
/// treated as `{}`.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    raw: String,
    value: serde_json::Value,
}

impl ToolArguments {
    /// Parse a raw arguments blob.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let trimmed = raw.trim();
        let value = if trimmed.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(trimmed).map_err(|e| {
                ChatError::InvalidArgument(format!("Failed to parse tool arguments: {e}"))
            })?
        };
        Ok(Self {
            raw: raw.to_string(),
            value,
        })
    }

    pub fn new(value: serde_json::Value) -> Self {
        Self {
            raw: value.to_string(),
            value,
        }
    }

    /// The blob exactly as streamed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ChatError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChatError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, ChatError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ChatError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, ChatError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ChatError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ChatError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ChatError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
