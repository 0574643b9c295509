use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Everything one model call returned that the parser may look at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The visible message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reasoning text, for servers that split it from the content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Native tool calls, in the order the model emitted them
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// A response carrying only message text
    pub fn text<S: Into<String>>(content: S) -> Self {
        ModelResponse {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_reasoning<S: Into<String>>(mut self, reasoning: S) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    pub fn with_finish_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn content_text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn reasoning_text(&self) -> &str {
        self.reasoning.as_deref().unwrap_or_default()
    }

    /// Reasoning followed by content, the form a raw completion would have had
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.reasoning_text(), self.content_text())
            .trim()
            .to_string()
    }

    /// The text to show as an answer: the content, or the reasoning when content is blank
    pub fn answer_text(&self) -> &str {
        if self.content_text().trim().is_empty() {
            self.reasoning_text()
        } else {
            self.content_text()
        }
    }
}
