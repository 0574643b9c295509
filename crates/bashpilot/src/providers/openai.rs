use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::base::{Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, get_usage, messages_to_openai_spec,
    openai_response_to_model_response, tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::response::ModelResponse;
use crate::models::tool::Tool;

/// Client for any server exposing the OpenAI chat completions API
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\n{}", status, body))
            }
        }
    }

    fn build_payload(&self, messages: &[Message], tools: &[Tool]) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert(
            "messages".to_string(),
            json!(messages_to_openai_spec(messages)),
        );

        if self.config.send_tools && !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        Ok(Value::Object(payload))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(ModelResponse, Usage)> {
        let payload = self.build_payload(messages, tools)?;
        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("API error: {}", error));
        }

        let message = openai_response_to_model_response(&response)?;
        let usage = get_usage(&response);
        tracing::debug!(
            model = %self.config.model,
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model call completed"
        );

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolCall;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: String) -> OpenAiProviderConfig {
        OpenAiProviderConfig::new(host, "test_api_key")
    }

    async fn setup_mock_server(response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "There are two folders.",
                    "reasoning_content": "Summarize the listing.",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });
        let server = setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;
        let provider = OpenAiProvider::new(config(server.uri()))?;

        let messages = vec![Message::user().with_text("Check folders")];
        let (response, usage) = provider.complete(&messages, &[]).await?;

        assert_eq!(response.content.as_deref(), Some("There are two folders."));
        assert_eq!(response.reasoning.as_deref(), Some("Summarize the listing."));
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "execute_bash",
                            "arguments": "{\"command\":\"ls -la\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-oss-20b",
                "max_tokens": 500,
                "tools": [{"type": "function", "function": {"name": "execute_bash"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&server)
            .await;

        let mut config = config(server.uri());
        config.send_tools = true;
        let provider = OpenAiProvider::new(config)?;

        let messages = vec![Message::user().with_text("List files")];
        let (response, usage) = provider
            .complete(&messages, &[Tool::execute_bash()])
            .await?;

        assert_eq!(
            response.tool_calls,
            vec![ToolCall::new("call_123", "execute_bash", json!("{\"command\":\"ls -la\"}"))]
        );
        assert_eq!(usage, Usage::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_tools_not_sent_by_default() -> Result<()> {
        let provider = OpenAiProvider::new(config("http://localhost".to_string()))?;
        let payload = provider.build_payload(&[Message::user().with_text("hi")], &[Tool::execute_bash()])?;
        assert!(payload.get("tools").is_none());
        assert_eq!(payload["temperature"], json!(0.7f32));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() -> Result<()> {
        let server = setup_mock_server(ResponseTemplate::new(503)).await;
        let provider = OpenAiProvider::new(config(server.uri()))?;
        let err = provider
            .complete(&[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Server error"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized() -> Result<()> {
        let server = setup_mock_server(ResponseTemplate::new(401).set_body_string("bad key")).await;
        let provider = OpenAiProvider::new(config(server.uri()))?;
        let err = provider
            .complete(&[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Request failed: 401"));
        Ok(())
    }

    #[tokio::test]
    async fn test_error_body() -> Result<()> {
        let body = json!({"error": {"code": "context_length_exceeded", "message": "too long"}});
        let server = setup_mock_server(ResponseTemplate::new(200).set_body_json(body)).await;
        let provider = OpenAiProvider::new(config(server.uri()))?;
        let err = provider
            .complete(&[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Context length exceeded"));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_choices() -> Result<()> {
        let server =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(json!({"choices": []}))).await;
        let provider = OpenAiProvider::new(config(server.uri()))?;
        let err = provider
            .complete(&[Message::user().with_text("hi")], &[])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No response from model");
        Ok(())
    }
}
