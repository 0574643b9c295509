use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::response::ModelResponse;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

enum Scripted {
    Reply(ModelResponse),
    Failure(String),
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Scripted>>>,
    received: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(
                responses.into_iter().map(Scripted::Reply).collect(),
            )),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a failed call after the responses already scripted
    pub fn with_failure<S: Into<String>>(self, message: S) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Scripted::Failure(message.into()));
        self
    }

    /// Number of completions requested so far
    pub fn calls(&self) -> usize {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The conversation as it was sent on each call
    pub fn snapshots(&self) -> Vec<Vec<Message>> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            return Ok((ModelResponse::default(), Usage::default()));
        }
        match responses.remove(0) {
            Scripted::Reply(response) => Ok((response, Usage::default())),
            Scripted::Failure(message) => Err(anyhow!(message)),
        }
    }
}
