use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, VideoGenerationRequest,
    VideoOperation,
};
use crate::ai::GenerativeBackend;
use crate::models::{Config, DEFAULT_BASE_URL};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;

/// Gemini REST backend used by every request kind.
pub struct GeminiHttpClient {
    client: Client,
    credential: RwLock<String>,
    credential_vars: Vec<String>,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, timeout, Client::new())
    }

    pub fn new_with_client(api_key: String, timeout: Duration, client: Client) -> Self {
        Self {
            client,
            credential: RwLock::new(api_key),
            credential_vars: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_key.clone(), config.request_timeout)
            .with_base_url(config.base_url.clone())
            .with_credential_vars(crate::models::API_KEY_VARS)
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Environment variables re-read by [`GenerativeBackend::refresh_credential`].
    pub fn with_credential_vars(mut self, vars: &[&str]) -> Self {
        self.credential_vars = vars.iter().map(|v| v.to_string()).collect();
        self
    }

    fn api_key(&self) -> String {
        self.credential
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .timeout(self.timeout)
            .header("x-goog-api-key", self.api_key())
    }

    async fn send<Resp: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Resp> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Failed to send request to Gemini: {}", e);
            e
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(backend_error(status, &error_text));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::Generic(format!("Failed to parse Gemini response: {}", e))
        })
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        self.send(self.authorized(self.client.post(&url)).json(request))
            .await
    }
}

/// Maps a non-2xx response onto [`Error::Backend`], keeping the structured
/// status from the JSON envelope when there is one.
fn backend_error(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => Error::Backend {
            status: Some(status.as_u16()),
            code: envelope.error.status,
            message: envelope.error.message,
        },
        Err(_) => Error::Backend {
            status: Some(status.as_u16()),
            code: None,
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl GenerativeBackend for GeminiHttpClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        tracing::debug!("Sending generateContent request to {}", model);
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        self.post(url, request).await
    }

    async fn start_video(
        &self,
        model: &str,
        request: &VideoGenerationRequest,
    ) -> Result<VideoOperation> {
        tracing::debug!("Submitting video job to {}", model);
        let url = format!("{}/v1beta/models/{}:predictLongRunning", self.base_url, model);
        self.post(url, request).await
    }

    async fn poll_operation(&self, operation: &VideoOperation) -> Result<VideoOperation> {
        let url = format!("{}/v1beta/{}", self.base_url, operation.name);
        self.send(self.authorized(self.client.get(&url))).await
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>> {
        let response = self.authorized(self.client.get(uri)).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini download failed (status {}): {}", status, error_text);
            return Err(backend_error(status, &error_text));
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn refresh_credential(&self) -> Result<()> {
        if self.credential_vars.is_empty() {
            return Ok(());
        }

        let latest = self
            .credential_vars
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));

        let mut credential = self
            .credential
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match latest {
            Some(key) => {
                if *credential != key {
                    tracing::info!("API credential changed, using the new key");
                    *credential = key;
                }
                Ok(())
            }
            None if credential.is_empty() => Err(Error::Config(format!(
                "No API credential found in {}",
                self.credential_vars.join(" or ")
            ))),
            None => {
                tracing::warn!("API credential variable unset, keeping the previous key");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::gemini::test_support;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer, api_key: &str) -> GeminiHttpClient {
        GeminiHttpClient::new(api_key.to_string(), Duration::from_secs(5))
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_generate_content_sends_key_and_model_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-3-flash-preview:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "hi" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, "test-key");
        let response = client
            .generate_content("gemini-3-flash-preview", &GenerateContentRequest::default())
            .await
            .unwrap();
        assert_eq!(response.text().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_rate_limit_envelope_is_quota_error() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let client = make_client(&server, "key");
        let err = client
            .generate_content("m", &GenerateContentRequest::default())
            .await
            .unwrap_err();

        match &err {
            Error::Backend { status, code, .. } => {
                assert_eq!(*status, Some(429));
                assert_eq!(code.as_deref(), Some("RESOURCE_EXHAUSTED"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_quota());
    }

    #[tokio::test]
    async fn test_plain_text_error_is_fatal() {
        let server = MockServer::start().await;

        test_support::post_path_regex(test_support::GENERATE_CONTENT_PATH_REGEX)
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = make_client(&server, "key");
        let err = client
            .generate_content("m", &GenerateContentRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { status: Some(500), .. }));
        assert!(!err.is_quota());
    }

    #[tokio::test]
    async fn test_poll_operation_gets_operation_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1beta/models/veo/operations/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "models/veo/operations/42",
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server, "key");
        let op = client
            .poll_operation(&VideoOperation::pending("models/veo/operations/42"))
            .await
            .unwrap();
        assert!(!op.done);
    }

    #[test]
    fn test_refresh_credential_reads_latest_env_value() {
        let var = "NEXUS_GENAI_TEST_REFRESH_KEY";
        std::env::set_var(var, "rotated");

        let client = GeminiHttpClient::new("initial".to_string(), Duration::from_secs(1))
            .with_credential_vars(&[var]);
        assert_eq!(client.api_key(), "initial");

        client.refresh_credential().unwrap();
        assert_eq!(client.api_key(), "rotated");

        std::env::remove_var(var);
        client.refresh_credential().unwrap();
        assert_eq!(client.api_key(), "rotated");
    }

    #[test]
    fn test_refresh_credential_without_any_key_fails() {
        let client = GeminiHttpClient::new(String::new(), Duration::from_secs(1))
            .with_credential_vars(&["NEXUS_GENAI_TEST_MISSING_KEY"]);
        assert!(matches!(client.refresh_credential(), Err(Error::Config(_))));
    }
}
