use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::MessageEncoding;

pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub redis: RedisConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub scheme: String,
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub default_model: String,
    pub connect_timeout_seconds: u64,
    pub first_byte_timeout_seconds: u64,
    pub stream_timeout_seconds: u64,
}

impl LlmConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host.trim_end_matches('/'))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn first_byte_timeout(&self) -> Duration {
        Duration::from_secs(self.first_byte_timeout_seconds)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_seconds)
    }
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("default_model", &self.default_model)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("first_byte_timeout_seconds", &self.first_byte_timeout_seconds)
            .field("stream_timeout_seconds", &self.stream_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Key prefix isolating this deployment inside a shared keyspace
    pub namespace: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
    pub encoding: MessageEncoding,
    pub welcome_message: String,
    /// Seeded as the first message of every fresh session when set
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
    #[serde(default)]
    pub directory: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self::builder()?.build()?.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("llm.scheme", "https")?
            .set_default("llm.host", "localhost:11434")?
            .set_default("llm.default_model", "llama3.1:8b")?
            .set_default("llm.connect_timeout_seconds", 10)?
            .set_default("llm.first_byte_timeout_seconds", 30)?
            .set_default("llm.stream_timeout_seconds", 300)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.namespace", "chat:")?
            .set_default("session.ttl_seconds", DEFAULT_SESSION_TTL_SECONDS as i64)?
            .set_default("session.encoding", "json")?
            .set_default(
                "session.welcome_message",
                "Welcome! Send a message to start the conversation.",
            )?
            .set_default("logging.filter", "info,chat_session_api=debug")?
            .set_default("logging.json", true)?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            ))
    }
}
