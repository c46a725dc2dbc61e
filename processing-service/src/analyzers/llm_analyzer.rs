use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::ServiceError;
use std::time::Duration;
use tracing::{debug, info};

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::{AnalyzerError, AnalyzerResult, SecurityAnalyzer};
use crate::config::LlmConfig;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for a hosted model deployment
pub struct LlmAnalyzer {
    http_client: Client,
    url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmAnalyzer {
    pub fn new(config: &LlmConfig) -> Result<Self, ServiceError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to build LLM client: {}", e)))?;

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint.trim_end_matches('/'),
            config.deployment,
            config.api_version
        );

        Ok(Self {
            http_client,
            url,
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl SecurityAnalyzer for LlmAnalyzer {
    async fn analyze(&self, ocr_text: &str) -> AnalyzerResult<String> {
        let prompt = build_prompt(ocr_text);
        let request = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("Requesting security analysis for {} characters", ocr_text.len());

        let response = self
            .http_client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(
                status,
                format!("Chat completion failed: {}", body),
            )
            .into());
        }

        let body = response.bytes().await.map_err(ServiceError::from)?;
        let completion: ChatResponse = serde_json::from_slice(&body).map_err(ServiceError::from)?;

        let analysis = completion
            .choices
            .into_iter()
            .next()
            .ok_or(AnalyzerError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default();

        info!("Security analysis returned {} characters", analysis.len());
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn analyzer(server: &mockito::Server) -> LlmAnalyzer {
        let config = LlmConfig {
            endpoint: server.url(),
            api_key: "llm-key".to_string(),
            deployment: "gpt-4o".to_string(),
            api_version: "2024-02-01".to_string(),
            max_tokens: 300,
            temperature: 0.0,
            request_timeout_seconds: 5,
        };
        LlmAnalyzer::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_analysis_text_is_returned_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let answer = "{\"sensitive\": true, \"riskLevel\": \"high\"}";

        let mock = server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::UrlEncoded(
                "api-version".to_string(),
                "2024-02-01".to_string(),
            ))
            .match_header("api-key", "llm-key")
            .match_body(Matcher::PartialJson(json!({ "max_tokens": 300 })))
            .with_status(200)
            .with_body(
                json!({"choices": [{"message": {"role": "assistant", "content": answer}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let analysis = analyzer(&server).analyze("password: hunter2").await.unwrap();

        assert_eq!(analysis, answer);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_prompt_carries_recognized_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .match_body(Matcher::Regex("AKIA1234EXAMPLE".to_string()))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"sensitive"}}]}"#)
            .create_async()
            .await;

        analyzer(&server).analyze("key AKIA1234EXAMPLE").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = analyzer(&server).analyze("text").await.unwrap_err();
        assert!(matches!(err, AnalyzerError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_status_errors_map_to_taxonomy() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = analyzer(&server).analyze("text").await.unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::Service(ServiceError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/deployments/gpt-4o/chat/completions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = analyzer(&server).analyze("text").await.unwrap_err();
        assert!(matches!(
            err,
            AnalyzerError::Service(ServiceError::MalformedResponse(_))
        ));
    }
}
