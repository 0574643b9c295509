use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::response::ModelResponse;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// Base trait for model clients (OpenAI-compatible servers, scripted mocks)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send the whole conversation and get the model's next response
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)>;
}
