/// Configuration for the intake service
///
/// Everything is read from the environment (a `.env` file is honoured) with
/// defaults suitable for a local emulator setup.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::storage::BlobConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: BlobConfig,
    pub poll: PollConfig,
    pub bot: BotConfig,
    pub attachments: AttachmentConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            server: ServerConfig::from_env()?,
            storage: BlobConfig::from_env()?,
            poll: PollConfig::from_env()?,
            bot: BotConfig::from_env(),
            attachments: AttachmentConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.poll.validate()?;
        self.bot.validate()?;
        self.attachments.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: BlobConfig::default(),
            poll: PollConfig::default(),
            bot: BotConfig::default(),
            attachments: AttachmentConfig::default(),
        }
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
                .unwrap_or_else(|_| "3978".to_string())
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
            port: 3978,
        }
    }
}

/// Report poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_seconds: u64,
}

impl PollConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_attempts: env::var("POLL_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid POLL_MAX_ATTEMPTS")?,
            interval_seconds: env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid POLL_INTERVAL_SECONDS")?,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            anyhow::bail!("POLL_MAX_ATTEMPTS must be at least 1");
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_seconds: 10,
        }
    }
}

/// Bot connector credentials and trust settings.
///
/// Without an app id inbound activities are accepted unauthenticated and
/// replies are sent without a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub app_id: Option<String>,
    #[serde(skip_serializing)]
    pub app_password: Option<String>,
    pub token_endpoint: String,
    pub token_scope: String,
    /// Host suffixes a reply (and its bearer token) may be sent to
    pub trusted_service_hosts: Vec<String>,
    pub openid_metadata_url: String,
    pub token_issuer: String,
}

impl BotConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            app_id: env::var("BOT_APP_ID").ok().filter(|s| !s.is_empty()),
            app_password: env::var("BOT_APP_PASSWORD").ok().filter(|s| !s.is_empty()),
            token_endpoint: env::var("BOT_TOKEN_ENDPOINT").unwrap_or(defaults.token_endpoint),
            token_scope: env::var("BOT_TOKEN_SCOPE").unwrap_or(defaults.token_scope),
            trusted_service_hosts: env::var("BOT_TRUSTED_SERVICE_HOSTS")
                .map(|hosts| parse_host_list(&hosts))
                .unwrap_or(defaults.trusted_service_hosts),
            openid_metadata_url: env::var("BOT_OPENID_METADATA_URL")
                .unwrap_or(defaults.openid_metadata_url),
            token_issuer: env::var("BOT_TOKEN_ISSUER").unwrap_or(defaults.token_issuer),
        }
    }

    /// True when `host` equals a trusted entry or is a subdomain of one.
    pub fn is_trusted_host(&self, host: Option<&str>) -> bool {
        let Some(host) = host.map(|h| h.to_ascii_lowercase()) else {
            return false;
        };
        self.trusted_service_hosts.iter().any(|entry| {
            host == *entry || host.ends_with(&format!(".{}", entry))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_some() && self.app_password.is_none() {
            anyhow::bail!("BOT_APP_PASSWORD is required when BOT_APP_ID is set");
        }
        if self.app_id.is_some() && self.trusted_service_hosts.is_empty() {
            anyhow::bail!("BOT_TRUSTED_SERVICE_HOSTS cannot be empty when BOT_APP_ID is set");
        }
        Ok(())
    }
}

fn parse_host_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|h| h.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_password: None,
            token_endpoint: "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token"
                .to_string(),
            token_scope: "https://api.botframework.com/.default".to_string(),
            trusted_service_hosts: vec![
                "botframework.com".to_string(),
                "trafficmanager.net".to_string(),
                "botframework.azure.us".to_string(),
            ],
            openid_metadata_url: "https://login.botframework.com/v1/.well-known/openidconfiguration"
                .to_string(),
            token_issuer: "https://api.botframework.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentConfig {
    pub max_size_mb: u64,
    pub download_timeout_seconds: u64,
}

impl AttachmentConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_size_mb: env::var("MAX_ATTACHMENT_MB")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid MAX_ATTACHMENT_MB")?,
            download_timeout_seconds: env::var("ATTACHMENT_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid ATTACHMENT_TIMEOUT_SECONDS")?,
        })
    }

    pub fn max_size_bytes(&self) -> usize {
        (self.max_size_mb * 1024 * 1024) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size_mb == 0 {
            anyhow::bail!("MAX_ATTACHMENT_MB must be at least 1");
        }
        Ok(())
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_size_mb: 20,
            download_timeout_seconds: 30,
        }
    }
}
