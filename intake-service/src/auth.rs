//! Inbound Bot Framework token validation
//!
//! Channel requests carry an RS256 JWT signed with a key from the Bot
//! Framework OpenID metadata. The token must name this bot as audience and
//! its `serviceurl` claim must match the activity being delivered.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use shared::ServiceError;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::models::Activity;

/// Signing keys are refetched after this long
const KEY_CACHE_HOURS: i64 = 24;
/// An unknown `kid` triggers a refetch at most this often
const MIN_REFRESH_SECS: i64 = 300;
/// Allowed clock skew
const LEEWAY_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    #[error("Token service URL does not match the activity")]
    ServiceUrlMismatch,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(e.to_string())
    }
}

/// Claims the bot relies on; audience, issuer and expiry are checked by `Validation`
#[derive(Debug, Clone, Deserialize)]
pub struct BotClaims {
    pub iss: String,
    #[serde(rename = "serviceurl", alias = "serviceUrl", default)]
    pub service_url: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct OpenIdMetadata {
    jwks_uri: String,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: DateTime<Utc>,
}

impl CachedKeys {
    fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}

pub struct BotAuthenticator {
    http_client: Client,
    app_id: String,
    issuer: String,
    metadata_url: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl BotAuthenticator {
    /// `None` when no app id is configured, in which case requests are not authenticated.
    pub fn new(config: &BotConfig) -> Result<Option<Self>, ServiceError> {
        let Some(app_id) = config.app_id.clone() else {
            return Ok(None);
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("ImageScreening-Intake/1.0")
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            http_client,
            app_id,
            issuer: config.token_issuer.clone(),
            metadata_url: config.openid_metadata_url.clone(),
            keys: RwLock::new(None),
        }))
    }

    /// Validate the `Authorization` header value sent with `activity`.
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        activity: &Activity,
    ) -> Result<BotClaims, AuthError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".to_string()))?;

        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.app_id.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.leeway = LEEWAY_SECS;

        let claims = decode::<BotClaims>(token, &key, &validation)?.claims;

        if claims.service_url.as_deref() != activity.service_url.as_deref() {
            warn!(
                "Token service URL {:?} does not match activity {:?}",
                claims.service_url, activity.service_url
            );
            return Err(AuthError::ServiceUrlMismatch);
        }

        Ok(claims)
    }

    async fn signing_key(&self, kid: &str) -> Result<Jwk, AuthError> {
        let now = Utc::now();
        let min_refresh = chrono::Duration::seconds(MIN_REFRESH_SECS);
        {
            let cached = self.keys.read().await;
            if let Some(keys) = cached.as_ref() {
                let found = keys.set.find(kid);
                if let Some(jwk) = found.filter(|_| keys.age(now) < chrono::Duration::hours(KEY_CACHE_HOURS)) {
                    return Ok(jwk.clone());
                }
                if found.is_none() && keys.age(now) < min_refresh {
                    return Err(AuthError::UnknownKey(kid.to_string()));
                }
            }
        }

        let mut cached = self.keys.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(keys) = cached.as_ref().filter(|k| k.age(now) < min_refresh) {
            return keys
                .set
                .find(kid)
                .cloned()
                .ok_or_else(|| AuthError::UnknownKey(kid.to_string()));
        }

        let set = self.fetch_keys().await?;
        let found = set.find(kid).cloned();
        *cached = Some(CachedKeys {
            set,
            fetched_at: Utc::now(),
        });

        found.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    async fn fetch_keys(&self) -> Result<JwkSet, ServiceError> {
        debug!("Fetching OpenID metadata from {}", self.metadata_url);
        let response = self.http_client.get(&self.metadata_url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_status(response.status(), "openid metadata"));
        }
        let metadata: OpenIdMetadata = response.json().await?;

        let response = self.http_client.get(&metadata.jwks_uri).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_status(response.status(), "signing keys"));
        }
        let set: JwkSet = response.json().await?;

        info!("Loaded {} bot signing key(s)", set.keys.len());
        Ok(set)
    }
}
