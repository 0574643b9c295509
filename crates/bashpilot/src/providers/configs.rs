use std::time::Duration;

/// Environment variable holding the API credential
pub const API_KEY_ENV: &str = "GPT_OSS_API_KEY";
/// Environment variable overriding the server address
pub const API_BASE_ENV: &str = "GPT_OSS_API_BASE";

pub const DEFAULT_HOST: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MODEL: &str = "gpt-oss-20b";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: i32 = 500;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout: Duration,
    /// Also declare tools through the API's native `tools` field
    pub send_tools: bool,
}

impl OpenAiProviderConfig {
    pub fn new<H: Into<String>, K: Into<String>>(host: H, api_key: K) -> Self {
        Self {
            host: host.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            send_tools: false,
        }
    }
}
