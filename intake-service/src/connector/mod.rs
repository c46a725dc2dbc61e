// Outbound chat transport

pub mod client;

pub use client::BotConnectorClient;

use async_trait::async_trait;
use shared::ServiceError;
use thiserror::Error;

use crate::models::Activity;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Activity has no {0}")]
    MissingField(&'static str),

    #[error("Invalid service URL: {0}")]
    InvalidServiceUrl(String),

    #[error("Service URL host is not trusted: {0}")]
    UntrustedServiceUrl(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Sends text back into the conversation an inbound activity came from
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn send_text(&self, inbound: &Activity, text: &str) -> ConnectorResult<()>;
}
