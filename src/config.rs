use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

use crate::constants;
use crate::error::ConfigError;

const CONFIG_PATH: &str = "config.yaml";

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_market_data_base_url")]
    pub base_url: String,
    #[serde(default = "default_market_data_cookie_url")]
    pub cookie_url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
}

fn default_host() -> String {
    constants::server::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    constants::server::DEFAULT_PORT
}

fn default_stream_buffer() -> usize {
    constants::server::DEFAULT_STREAM_BUFFER
}

fn default_llm_base_url() -> String {
    constants::llm::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    constants::llm::DEFAULT_MODEL.to_string()
}

fn default_max_rounds() -> usize {
    constants::llm::DEFAULT_MAX_ROUNDS
}

fn default_market_data_base_url() -> String {
    constants::market_data::DEFAULT_BASE_URL.to_string()
}

fn default_market_data_cookie_url() -> String {
    constants::market_data::DEFAULT_COOKIE_URL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_llm_base_url(),
            model: default_model(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_base_url(),
            cookie_url: default_market_data_cookie_url(),
        }
    }
}

// Keeps the API key out of startup logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}

impl AppConfig {
    /// Load `.env`, then `config.yaml` if present, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside local development
        let _ = dotenvy::dotenv();

        let mut config = if Path::new(CONFIG_PATH).exists() {
            let content = fs::read_to_string(CONFIG_PATH).map_err(|source| ConfigError::Read {
                path: CONFIG_PATH.to_string(),
                source,
            })?;
            Self::from_yaml_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: CONFIG_PATH.to_string(),
            source,
        })
    }

    /// Apply environment-style overrides. `lookup` returns the value for a key, if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(rounds) = lookup("AGENT_MAX_ROUNDS") {
            self.llm.max_rounds = parse_number("AGENT_MAX_ROUNDS", &rounds)?;
        }
        if let Some(url) = lookup("MARKET_DATA_BASE_URL") {
            self.market_data.base_url = url;
        }
        if let Some(url) = lookup("MARKET_DATA_COOKIE_URL") {
            self.market_data.cookie_url = url;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_number("PORT", &port)?;
        }
        if let Some(buffer) = lookup("STREAM_BUFFER") {
            self.server.stream_buffer = parse_number("STREAM_BUFFER", &buffer)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("llm.base_url", &self.llm.base_url)?;
        validate_url("market_data.base_url", &self.market_data.base_url)?;
        validate_url("market_data.cookie_url", &self.market_data.cookie_url)?;

        if self.llm.max_rounds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "llm.max_rounds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.stream_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.stream_buffer".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}
