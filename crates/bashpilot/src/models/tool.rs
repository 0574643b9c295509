use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the single tool the agent declares
pub const BASH_TOOL_NAME: &str = "execute_bash";
/// Namespace that function tools live in when addressed through harmony recipients
pub const FUNCTIONS_NAMESPACE: &str = "functions";

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A JSON schema object describing the arguments
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The bash tool: one required string parameter `command`
    pub fn execute_bash() -> Self {
        Tool::new(
            BASH_TOOL_NAME,
            "Execute bash commands to check files, directories, run commands, etc.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "Bash command to execute (e.g., 'ls -la', 'cat file.txt')"
                    }
                },
                "required": ["command"]
            }),
        )
    }

    /// The recipient a harmony message uses to address this tool
    pub fn recipient(&self) -> String {
        format!("{}.{}", FUNCTIONS_NAMESPACE, self.name)
    }
}

/// A tool call as reported by a model API's native tool-call field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    /// The name of the function the model wants to call
    pub name: String,
    /// Either a JSON string or an already decoded JSON object
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, name: S, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Decode the arguments into a JSON value
    pub fn decoded_arguments(&self) -> serde_json::Result<Value> {
        match &self.arguments {
            Value::String(raw) => serde_json::from_str(raw),
            other => Ok(other.clone()),
        }
    }
}
