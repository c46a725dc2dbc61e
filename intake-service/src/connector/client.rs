use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use shared::ServiceError;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{ChatConnector, ConnectorError, ConnectorResult};
use crate::config::BotConfig;
use crate::models::Activity;

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Bot connector REST client with client-credentials token caching
pub struct BotConnectorClient {
    http_client: Client,
    config: BotConfig,
    token: RwLock<Option<CachedToken>>,
}

impl BotConnectorClient {
    pub fn new(config: BotConfig) -> ConnectorResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("ImageScreening-Intake/1.0")
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
            token: RwLock::new(None),
        })
    }

    /// `None` when no app id is configured (local emulator).
    async fn access_token(&self) -> ConnectorResult<Option<String>> {
        let (Some(app_id), Some(app_password)) = (&self.config.app_id, &self.config.app_password)
        else {
            return Ok(None);
        };

        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
                return Ok(Some(token.value.clone()));
            }
        }

        let mut cached = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(Some(token.value.clone()));
        }

        debug!("Requesting bot connector token");
        let response = self
            .http_client
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", app_id.as_str()),
                ("client_secret", app_password.as_str()),
                ("scope", self.config.token_scope.as_str()),
            ])
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        if !status.is_success() {
            error!("Token request failed: {}", status);
            return Err(ServiceError::from_status(status, "bot token request").into());
        }

        let token: TokenResponse = response.json().await.map_err(ServiceError::from)?;
        let fresh = CachedToken {
            value: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        };
        info!("Bot connector token refreshed, expires at {}", fresh.expires_at);

        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(Some(value))
    }
}

/// `{serviceUrl}/v3/conversations/{conversationId}/activities`
fn activities_url(service_url: &str, conversation_id: &str) -> ConnectorResult<Url> {
    let mut url = Url::parse(service_url)
        .map_err(|e| ConnectorError::InvalidServiceUrl(format!("{}: {}", service_url, e)))?;

    url.path_segments_mut()
        .map_err(|_| ConnectorError::InvalidServiceUrl(service_url.to_string()))?
        .pop_if_empty()
        .extend(["v3", "conversations", conversation_id, "activities"]);

    Ok(url)
}

#[async_trait]
impl ChatConnector for BotConnectorClient {
    async fn send_text(&self, inbound: &Activity, text: &str) -> ConnectorResult<()> {
        let service_url = inbound
            .service_url
            .as_deref()
            .ok_or(ConnectorError::MissingField("serviceUrl"))?;
        let conversation_id = inbound
            .conversation_id()
            .ok_or(ConnectorError::MissingField("conversation"))?;

        let url = activities_url(service_url, conversation_id)?;
        // Credentials only ever go to a trusted channel host
        if self.config.app_id.is_some() && !self.config.is_trusted_host(url.host_str()) {
            warn!("Refusing to reply to untrusted service URL {}", service_url);
            return Err(ConnectorError::UntrustedServiceUrl(service_url.to_string()));
        }
        let reply = inbound.reply_with_text(text);

        let mut request = self.http_client.post(url).json(&reply);
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ServiceError::from)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send reply to {}: {} - {}", conversation_id, status, body);
            return Err(ServiceError::from_status(status, "send activity").into());
        }

        debug!("Reply sent to conversation {}", conversation_id);
        Ok(())
    }
}
