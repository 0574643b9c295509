use serde::{Deserialize, Serialize};

/// What the agent should do next, as interpreted from one model response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// Run this shell command. Never empty, passed through without sanitization.
    RunCommand { command: String },
    /// The model considers the task complete
    FinalAnswer { text: String },
    /// Nothing recognizable was found in the response
    Unparseable,
}

impl Decision {
    pub fn run<S: Into<String>>(command: S) -> Self {
        Decision::RunCommand {
            command: command.into(),
        }
    }

    pub fn answer<S: Into<String>>(text: S) -> Self {
        Decision::FinalAnswer { text: text.into() }
    }

    pub fn as_command(&self) -> Option<&str> {
        match self {
            Decision::RunCommand { command } => Some(command),
            _ => None,
        }
    }
}
