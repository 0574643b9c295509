use super::content::ContentPart;
use super::role::Role;
use serde_json::Value;

/// Channel carrying reasoning the user never sees
pub const CHANNEL_ANALYSIS: &str = "analysis";
/// Channel carrying tool calls and their results
pub const CHANNEL_COMMENTARY: &str = "commentary";
/// Channel carrying the user-facing answer
pub const CHANNEL_FINAL: &str = "final";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
/// One turn in a conversation with an LLM
pub struct Message {
    pub role: Role,
    /// Set for messages authored by a tool, e.g. `functions.execute_bash`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Set only for tool invocations and for tool results addressed back to the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Declared format of the body, e.g. `json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Message {
            role,
            author_name: None,
            recipient: None,
            channel: None,
            content_type: None,
            content: Vec::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn developer() -> Self {
        Self::new(Role::Developer)
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a tool result message authored by the named tool
    pub fn tool<S: Into<String>>(author_name: S) -> Self {
        Self::new(Role::Tool).with_author_name(author_name)
    }

    pub fn with_author_name<S: Into<String>>(mut self, name: S) -> Self {
        self.author_name = Some(name.into());
        self
    }

    pub fn with_recipient<S: Into<String>>(mut self, recipient: S) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_channel<S: Into<String>>(mut self, channel: S) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add any ContentPart to the message
    pub fn with_content(mut self, content: ContentPart) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentPart::text(text))
    }

    /// Add structured JSON content to the message
    pub fn with_json(self, payload: Value) -> Self {
        self.with_content(ContentPart::json(payload))
    }

    /// A message with a non-empty recipient is a candidate tool call
    pub fn is_tool_call(&self) -> bool {
        self.recipient
            .as_deref()
            .is_some_and(|recipient| !recipient.trim().is_empty())
            && self.role != Role::Tool
    }

    /// The first content part, where tool calls carry their arguments
    pub fn first_part(&self) -> Option<&ContentPart> {
        self.content.first()
    }

    /// All text parts joined with a single space
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|part| part.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Who wrote this message, as named in the harmony header
    pub fn author(&self) -> String {
        match &self.author_name {
            Some(name) => name.clone(),
            None => self.role.to_string(),
        }
    }
}
