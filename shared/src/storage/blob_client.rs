/// Blob storage client over the REST API
///
/// Requests are authorized with a shared access signature appended to every
/// URL, so no request signing happens here.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::ObjectStore;
use crate::types::error::{ServiceError, ServiceResult};

const API_VERSION: &str = "2021-08-06";

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// e.g. `https://account.blob.core.windows.net`
    pub account_url: String,
    pub container: String,
    pub sas_token: Option<String>,
    pub timeout_seconds: u64,
    pub max_object_size_mb: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            account_url: "http://127.0.0.1:10000/devstoreaccount1".to_string(), // Azurite default
            container: "screening".to_string(),
            sas_token: None,
            timeout_seconds: 60,
            max_object_size_mb: 50,
        }
    }
}

impl BlobConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            account_url: std::env::var("BLOB_ACCOUNT_URL").unwrap_or(defaults.account_url),
            container: std::env::var("BLOB_CONTAINER").unwrap_or(defaults.container),
            sas_token: std::env::var("BLOB_SAS_TOKEN").ok().filter(|s| !s.is_empty()),
            timeout_seconds: std::env::var("BLOB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| defaults.timeout_seconds.to_string())
                .parse()
                .context("Invalid BLOB_TIMEOUT_SECONDS")?,
            max_object_size_mb: std::env::var("BLOB_MAX_OBJECT_MB")
                .unwrap_or_else(|_| defaults.max_object_size_mb.to_string())
                .parse()
                .context("Invalid BLOB_MAX_OBJECT_MB")?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.account_url.is_empty() {
            anyhow::bail!("BLOB_ACCOUNT_URL cannot be empty");
        }
        if self.container.is_empty() {
            anyhow::bail!("BLOB_CONTAINER cannot be empty");
        }
        Ok(())
    }
}

/// Blob client for object storage operations
pub struct BlobClient {
    config: BlobConfig,
    http_client: Client,
    container_url: String,
}

impl BlobClient {
    pub fn new(config: BlobConfig) -> ServiceResult<Self> {
        info!("Initializing blob client for container: {}", config.container);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let container_url = format!(
            "{}/{}",
            config.account_url.trim_end_matches('/'),
            config.container
        );

        Ok(Self {
            config,
            http_client,
            container_url,
        })
    }

    pub fn container(&self) -> &str {
        &self.config.container
    }

    fn object_url(&self, key: &str) -> String {
        self.with_sas(format!("{}/{}", self.container_url, key))
    }

    fn with_sas(&self, url: String) -> String {
        match self.config.sas_token.as_deref().map(|t| t.trim_start_matches('?')) {
            Some(token) if !token.is_empty() => format!("{}?{}", url, token),
            _ => url,
        }
    }

    fn check_size(&self, key: &str, len: usize) -> ServiceResult<()> {
        let limit = self.config.max_object_size_mb * 1024 * 1024;
        if len as u64 > limit {
            return Err(ServiceError::Upstream {
                status: StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
                message: format!(
                    "Object {} is {} bytes, limit is {} MB",
                    key, len, self.config.max_object_size_mb
                ),
            });
        }
        Ok(())
    }

    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        if_absent: bool,
    ) -> ServiceResult<()> {
        debug!("Uploading blob: {} ({} bytes)", key, data.len());
        self.check_size(key, data.len())?;

        let mut request = self
            .http_client
            .put(self.object_url(key))
            .header("x-ms-version", API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header(header::CONTENT_TYPE, content_type)
            .body(data);

        if if_absent {
            request = request.header(header::IF_NONE_MATCH, "*");
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status != StatusCode::CONFLICT && status != StatusCode::PRECONDITION_FAILED {
                error!("Blob upload failed: {} - {}", status, error_text);
            }
            return Err(ServiceError::from_status(status, format!("put {}", key)));
        }

        info!("Blob uploaded successfully: {}", key);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for BlobClient {
    async fn ensure_container(&self) -> ServiceResult<()> {
        let url = self.with_sas(self.container_url.clone());

        let response = self
            .http_client
            .put(url)
            .query(&[("restype", "container")])
            .header("x-ms-version", API_VERSION)
            .header(header::CONTENT_LENGTH, 0)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!("Created container: {}", self.config.container);
                Ok(())
            }
            StatusCode::CONFLICT => {
                debug!("Container already exists: {}", self.config.container);
                Ok(())
            }
            status => Err(ServiceError::from_status(
                status,
                format!("create container {}", self.config.container),
            )),
        }
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
        self.upload(key, data, content_type, false).await
    }

    async fn create_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
        self.upload(key, data, content_type, true).await
    }

    async fn get_object(&self, key: &str) -> ServiceResult<Vec<u8>> {
        debug!("Downloading blob: {}", key);

        let response = self
            .http_client
            .get(self.object_url(key))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let data = response.bytes().await?.to_vec();
                debug!("Blob downloaded successfully: {} ({} bytes)", key, data.len());
                Ok(data)
            }
            StatusCode::NOT_FOUND => Err(ServiceError::NotFound(key.to_string())),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                error!("Blob download failed: {} - {}", status, error_text);
                Err(ServiceError::from_status(status, format!("get {}", key)))
            }
        }
    }

    async fn exists(&self, key: &str) -> ServiceResult<bool> {
        let response = self
            .http_client
            .head(self.object_url(key))
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(ServiceError::from_status(status, format!("head {}", key))),
        }
    }

    async fn list_keys(&self, prefix: &str) -> ServiceResult<Vec<String>> {
        debug!("Listing blobs with prefix: {}", prefix);

        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![
                ("restype", "container".to_string()),
                ("comp", "list".to_string()),
                ("prefix", prefix.to_string()),
            ];
            if let Some(m) = &marker {
                query.push(("marker", m.clone()));
            }

            let response = self
                .http_client
                .get(self.with_sas(self.container_url.clone()))
                .query(&query)
                .header("x-ms-version", API_VERSION)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ServiceError::from_status(status, format!("list {}", prefix)));
            }

            let body = response.text().await?;
            keys.extend(parse_list_response(&body));

            marker = extract_elements(&body, "NextMarker")
                .into_iter()
                .find(|m| !m.is_empty());
            if marker.is_none() {
                break;
            }
        }

        Ok(keys)
    }
}

/// Blob names from a list-blobs XML body
fn parse_list_response(xml: &str) -> Vec<String> {
    extract_elements(xml, "Name")
}

// The list body is flat enough that scanning for tags is sufficient.
fn extract_elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        values.push(unescape_xml(after[..end].trim()));
        rest = &after[end + close.len()..];
    }

    values
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    fn client_for(server: &mockito::ServerGuard) -> BlobClient {
        BlobClient::new(BlobConfig {
            account_url: server.url(),
            container: "screening".to_string(),
            sas_token: Some("?sv=2021&sig=abc".to_string()),
            timeout_seconds: 5,
            max_object_size_mb: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_blob_config_default() {
        let config = BlobConfig::default();
        assert_eq!(config.container, "screening");
        assert!(config.sas_token.is_none());
    }

    #[test]
    fn test_object_url_appends_sas() {
        let client = BlobClient::new(BlobConfig {
            account_url: "https://acct.blob.core.windows.net/".to_string(),
            sas_token: Some("?sv=1&sig=x".to_string()),
            ..BlobConfig::default()
        })
        .unwrap();

        assert_eq!(
            client.object_url("images/abc"),
            "https://acct.blob.core.windows.net/screening/images/abc?sv=1&sig=x"
        );
    }

    #[test]
    fn test_parse_list_response() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ContainerName="screening"><Blobs><Blob><Name>images/a</Name></Blob><Blob><Name>images/b&amp;c</Name></Blob></Blobs><NextMarker /></EnumerationResults>"#;
        assert_eq!(parse_list_response(xml), vec!["images/a", "images/b&c"]);
        assert!(extract_elements(xml, "NextMarker").is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/screening/images/abc")
            .match_query(Matcher::UrlEncoded("sig".into(), "abc".into()))
            .match_header("x-ms-blob-type", "BlockBlob")
            .match_header("content-type", "image/png")
            .match_body(Matcher::Exact("pixels".to_string()))
            .with_status(201)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/screening/images/abc")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("pixels")
            .create_async()
            .await;

        let client = client_for(&server);
        client
            .put_object("images/abc", b"pixels".to_vec(), "image/png")
            .await
            .unwrap();
        let data = client.get_object("images/abc").await.unwrap();

        assert_eq!(data, b"pixels".to_vec());
        put.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_object_conflict_is_already_exists() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/screening/reports/abc.json")
            .match_query(Matcher::Any)
            .match_header("if-none-match", "*")
            .with_status(409)
            .with_body("BlobAlreadyExists")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .create_object("reports/abc.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::AlreadyExists(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_missing_object_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/screening/reports/missing.json")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_object("reports/missing.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_forbidden_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/screening/images/abc")
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.get_object("images/abc").await.unwrap_err();
        assert!(matches!(err, ServiceError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_exists_uses_head() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/screening/images/present")
            .match_query(Matcher::Any)
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", "/screening/images/absent")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.exists("images/present").await.unwrap());
        assert!(!client.exists("images/absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_container_tolerates_existing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/screening")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .with_status(409)
            .create_async()
            .await;

        let client = client_for(&server);
        client.ensure_container().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_keys_follows_marker() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/screening")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("comp".into(), "list".into()),
                Matcher::UrlEncoded("prefix".into(), "images/".into()),
            ]))
            .with_status(200)
            .with_body("<EnumerationResults><Blobs><Blob><Name>images/a</Name></Blob></Blobs><NextMarker>page2</NextMarker></EnumerationResults>")
            .expect(1)
            .create_async()
            .await;
        // The first mock is satisfied after one hit, so the marker request lands here
        let second = server
            .mock("GET", "/screening")
            .match_query(Matcher::UrlEncoded("marker".into(), "page2".into()))
            .with_status(200)
            .with_body("<EnumerationResults><Blobs><Blob><Name>images/b</Name></Blob></Blobs><NextMarker /></EnumerationResults>")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let keys = client.list_keys("images/").await.unwrap();

        assert_eq!(keys, vec!["images/a", "images/b"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_locally() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server);
        let err = client
            .put_object("images/big", vec![0u8; 2 * 1024 * 1024], "image/png")
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Upstream { status: 413, .. }));
    }
}
