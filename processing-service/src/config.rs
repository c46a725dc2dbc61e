/// Configuration module for the processing service
///
/// This module provides centralized configuration management with support for:
/// - Environment variable loading
/// - Default values
/// - Configuration validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::retry::Backoff;
use shared::storage::BlobConfig;
use std::env;
use std::time::Duration;

/// Main configuration structure for the processing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: BlobConfig,
    pub ocr: OcrConfig,
    pub llm: LlmConfig,
    pub watcher: WatcherConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            server: ServerConfig::from_env()?,
            storage: BlobConfig::from_env()?,
            ocr: OcrConfig::from_env()?,
            llm: LlmConfig::from_env()?,
            watcher: WatcherConfig::from_env()?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.ocr.validate()?;
        self.llm.validate()?;
        self.watcher.validate()?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8002".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
        }
    }
}

/// Read (OCR) endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// e.g. `https://myvision.cognitiveservices.azure.com`
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub subscription_key: String,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_seconds: u64,
}

impl OcrConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env::var("OCR_ENDPOINT").unwrap_or_default(),
            subscription_key: env::var("OCR_KEY").unwrap_or_default(),
            max_retries: env::var("OCR_MAX_RETRIES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid OCR_MAX_RETRIES")?,
            initial_delay_ms: env::var("OCR_INITIAL_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("Invalid OCR_INITIAL_DELAY_MS")?,
            max_delay_ms: env::var("OCR_MAX_DELAY_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("Invalid OCR_MAX_DELAY_MS")?,
            request_timeout_seconds: env::var("OCR_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid OCR_TIMEOUT_SECONDS")?,
        })
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_retries,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("OCR_ENDPOINT cannot be empty");
        }
        if self.subscription_key.is_empty() {
            anyhow::bail!("OCR_KEY cannot be empty");
        }
        if self.max_retries == 0 {
            anyhow::bail!("OCR_MAX_RETRIES must be at least 1");
        }
        if self.initial_delay_ms > self.max_delay_ms {
            anyhow::bail!("OCR_INITIAL_DELAY_MS cannot exceed OCR_MAX_DELAY_MS");
        }
        Ok(())
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            subscription_key: String::new(),
            max_retries: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            request_timeout_seconds: 30,
        }
    }
}

/// Generative-text endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_seconds: u64,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            endpoint: env::var("LLM_ENDPOINT").unwrap_or_default(),
            api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            deployment: env::var("LLM_DEPLOYMENT").unwrap_or(defaults.deployment),
            api_version: env::var("LLM_API_VERSION").unwrap_or(defaults.api_version),
            max_tokens: env::var("LLM_MAX_TOKENS")
                .unwrap_or_else(|_| "800".to_string())
                .parse()
                .context("Invalid LLM_MAX_TOKENS")?,
            temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.0".to_string())
                .parse()
                .context("Invalid LLM_TEMPERATURE")?,
            request_timeout_seconds: env::var("LLM_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid LLM_TIMEOUT_SECONDS")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            anyhow::bail!("LLM_ENDPOINT cannot be empty");
        }
        if self.api_key.is_empty() {
            anyhow::bail!("LLM_API_KEY cannot be empty");
        }
        if self.deployment.is_empty() {
            anyhow::bail!("LLM_DEPLOYMENT cannot be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("LLM_TEMPERATURE must be between 0 and 2");
        }
        Ok(())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            max_tokens: 800,
            temperature: 0.0,
            request_timeout_seconds: 60,
        }
    }
}

/// Store watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub max_concurrent: usize,
}

impl WatcherConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enabled: parse_flag(&env::var("WATCH_ENABLED").unwrap_or_else(|_| "true".to_string()))
                .context("Invalid WATCH_ENABLED")?,
            interval_seconds: env::var("WATCH_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid WATCH_INTERVAL_SECONDS")?,
            max_concurrent: env::var("WATCH_MAX_CONCURRENT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("Invalid WATCH_MAX_CONCURRENT")?,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_seconds == 0 {
            anyhow::bail!("WATCH_INTERVAL_SECONDS must be at least 1");
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("WATCH_MAX_CONCURRENT must be at least 1");
        }
        Ok(())
    }
}

/// Accepts `true`/`false` and `1`/`0`, case-insensitively.
fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => anyhow::bail!("expected true or false, got {:?}", other),
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 5,
            max_concurrent: 4,
        }
    }
}
