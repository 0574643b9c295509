use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One part of a message body.
///
/// Every part exposes its text. Parts that were built from structured data also keep
/// the value they were built from so callers do not need to re-parse the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart {
            text: text.into(),
            payload: None,
        }
    }

    /// A part carrying a JSON value, with its compact serialization as text
    pub fn json(payload: Value) -> Self {
        ContentPart {
            text: payload.to_string(),
            payload: Some(payload),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Interpret this part as JSON, preferring the attached payload over the text
    pub fn as_json(&self) -> serde_json::Result<Value> {
        match &self.payload {
            Some(payload) => Ok(payload.clone()),
            None => serde_json::from_str(self.text.trim()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.payload.is_none()
    }
}
