use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use bashpilot::agent::{AgentConfig, DEFAULT_MAX_ITERATIONS};
use bashpilot::providers::configs::{
    OpenAiProviderConfig, API_BASE_ENV, API_KEY_ENV, DEFAULT_HOST, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TEMPERATURE,
};
use bashpilot::runner::{CommandRunner, DEFAULT_OUTPUT_LIMIT, DEFAULT_SHELL, DEFAULT_TIMEOUT};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Settings file looked up in the working directory, any extension the config crate knows
pub const CONFIG_FILE: &str = "bashpilot";

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<i32>,
    /// Seconds
    #[serde(default = "default_request_timeout")]
    pub timeout: u64,
    /// Declare the bash tool through the API's `tools` field as well as the developer message
    #[serde(default)]
    pub send_tools: bool,
}

impl ProviderSettings {
    // Convert to the bashpilot client config
    pub fn into_config(self) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout),
            send_tools: self.send_tools,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,
    /// Bytes kept per output stream
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,
    /// Defaults to the current directory; `~` and `$VARS` are expanded
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            command_timeout: default_command_timeout(),
            output_limit: default_output_limit(),
            working_dir: None,
            shell: default_shell(),
        }
    }
}

impl AgentSettings {
    pub fn working_dir(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(raw) = self.working_dir.as_deref() else {
            return Ok(None);
        };
        let expanded = shellexpand::full(raw).map_err(|e| ConfigError::InvalidValue {
            key: "agent.working_dir".to_string(),
            message: e.to_string(),
        })?;
        let path = PathBuf::from(expanded.as_ref());
        if !path.is_dir() {
            return Err(ConfigError::InvalidValue {
                key: "agent.working_dir".to_string(),
                message: format!("{} is not a directory", path.display()),
            });
        }
        Ok(Some(path))
    }

    pub fn runner(&self) -> Result<CommandRunner, ConfigError> {
        let mut runner = CommandRunner::new()
            .with_shell(self.shell.clone())
            .with_output_limit(self.output_limit);
        if let Some(dir) = self.working_dir()? {
            runner = runner.with_working_dir(dir);
        }
        Ok(runner)
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_max_iterations(self.max_iterations)
            .with_command_timeout(Duration::from_secs(self.command_timeout))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(CONFIG_FILE)
    }

    /// Load settings with `config_file` (no extension) as the optional settings file
    pub fn load(config_file: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Provider defaults
            .set_default("provider.host", default_host())?
            .set_default("provider.model", default_model())?
            // Agent defaults
            .set_default("agent.max_iterations", default_max_iterations() as u64)?
            .set_default("agent.shell", default_shell())?
            .add_source(File::with_name(config_file).required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // The variables the model server tooling already uses win over everything
            .set_override_option("provider.api_key", env::var(API_KEY_ENV).ok())?
            .set_override_option("provider.host", env::var(API_BASE_ENV).ok())?
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Handle missing field errors specially
        let settings = match result {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `api_key`"
                    let field = error_str.split('`').nth(1).unwrap_or_default();
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                } else if let config::ConfigError::NotFound(field) = &err {
                    return Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    });
                }
                return Err(ConfigError::Other(err));
            }
        };

        if settings.provider.api_key.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("provider.api_key"),
            });
        }
        Ok(settings)
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> Option<f32> {
    Some(DEFAULT_TEMPERATURE)
}

fn default_max_tokens() -> Option<i32> {
    Some(DEFAULT_MAX_TOKENS)
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_command_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_output_limit() -> usize {
    DEFAULT_OUTPUT_LIMIT
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}
