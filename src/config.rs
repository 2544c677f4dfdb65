use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_parameters_config")]
    pub parameters: ParametersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Public base URL Telegram delivers webhooks to (`APP_URL`).
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Port the webhook server listens on (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ParametersConfig {
    /// Parameter path holding one bot token per key.
    #[serde(default = "default_token_prefix")]
    pub token_prefix: String,
    /// Parameter holding the destination topic ARN.
    #[serde(default = "default_topic_parameter")]
    pub topic_parameter: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct TelegramConfig {
    /// Bot API server to talk to instead of api.telegram.org (`TELEGRAM_API_URL`).
    #[serde(default)]
    pub api_url: Option<String>,
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_token_prefix() -> String {
    "/telegram/token/".to_string()
}

fn default_topic_parameter() -> String {
    "/telegram/topic/command".to_string()
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        public_url: default_public_url(),
        port: default_port(),
    }
}

fn default_parameters_config() -> ParametersConfig {
    ParametersConfig {
        token_prefix: default_token_prefix(),
        topic_parameter: default_topic_parameter(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server_config(),
            parameters: default_parameters_config(),
            telegram: TelegramConfig::default(),
        }
    }
}

impl Config {
    /// Load settings from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `APP_URL`, `PORT`, `RELAY_TOKEN_PREFIX`, `RELAY_TOPIC_PARAMETER`
    /// and `TELEGRAM_API_URL`.
    ///
    /// Empty values are treated as unset.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = value("APP_URL") {
            self.server.public_url = url;
        }
        if let Some(port) = value("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(prefix) = value("RELAY_TOKEN_PREFIX") {
            self.parameters.token_prefix = prefix;
        }
        if let Some(name) = value("RELAY_TOPIC_PARAMETER") {
            self.parameters.topic_parameter = name;
        }
        if let Some(url) = value("TELEGRAM_API_URL") {
            self.telegram.api_url = Some(url);
        }

        Ok(self)
    }

    pub fn public_url(&self) -> Result<Url> {
        Url::parse(&self.server.public_url)
            .with_context(|| format!("Invalid public URL: {}", self.server.public_url))
    }

    pub fn telegram_api_url(&self) -> Result<Option<Url>> {
        self.telegram
            .api_url
            .as_deref()
            .map(|url| {
                Url::parse(url).with_context(|| format!("Invalid Telegram API URL: {}", url))
            })
            .transpose()
    }
}
