use bashpilot::providers::configs::API_KEY_ENV;
use thiserror::Error;

pub const ENV_PREFIX: &str = "BASHPILOT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a settings key, e.g. `agent.shell` -> `BASHPILOT_AGENT__SHELL`
pub fn to_env_var(field: &str) -> String {
    if field == "api_key" || field.ends_with(".api_key") {
        return API_KEY_ENV.to_string();
    }
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}
