use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("failed to execute command: {0}")]
    ExecutionError(String),

    #[error("model call failed: {0}")]
    ModelError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Errors from the command runner itself, as opposed to a command that ran and failed
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("could not start `{shell}`: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for command: {0}")]
    Wait(#[source] std::io::Error),
}

impl From<RunnerError> for AgentError {
    fn from(err: RunnerError) -> Self {
        AgentError::ExecutionError(err.to_string())
    }
}

/// Malformed harmony markup, reported by strict decoding only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarmonyError {
    #[error("header at byte {0} is never followed by <|message|>")]
    UnterminatedHeader(usize),

    #[error("unknown author `{0}` in message header")]
    UnknownAuthor(String),

    #[error("unexpected text outside of a message at byte {0}")]
    StrayText(usize),
}
