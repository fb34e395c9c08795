use super::{AnalyticsApi, ApiResult, CodeObjectsRequest};
use crate::config::AnalyticsConfig;
use crate::error::{ConfigError, GatewayError, SyncError};
use crate::types::{
    CodeObjectError, CodeObjectId, CodeObjectInsight, CodeObjectKind, CodeObjectSummary,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Analytics API client performing one HTTP round trip per call
pub struct HttpAnalyticsClient {
    client: Client,
    base_url: String,
}

impl HttpAnalyticsClient {
    /// Build a client with JSON headers, the configured bearer token and a
    /// bounded request timeout
    pub fn new(config: &AnalyticsConfig) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = config.api_token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                ConfigError::ClientBuildFailed(format!("Invalid API token header: {}", e))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::ClientBuildFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and decode a JSON array body
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(format!("Failed to read response body: {}", e)))?;

        decode_body(&bytes)
    }
}

/// An empty body (or a bare `null`) is "no result", anything else must be an array
pub(crate) fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> ApiResult<T> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| GatewayError::Decoding(format!("Body is not UTF-8: {}", e)))?
        .trim();

    if text.is_empty() || text == "null" {
        return Ok(None);
    }

    serde_json::from_str::<Vec<T>>(text)
        .map(Some)
        .map_err(|e| GatewayError::Decoding(e.to_string()))
}

#[async_trait::async_trait]
impl AnalyticsApi for HttpAnalyticsClient {
    async fn list_environments(&self) -> ApiResult<String> {
        self.execute(self.client.get(self.url("environments"))).await
    }

    async fn fetch_summaries(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectSummary> {
        let body = CodeObjectsRequest {
            environment,
            code_object_ids: ids,
        };
        self.execute(self.client.post(self.url("summary")).json(&body))
            .await
    }

    async fn fetch_insights(
        &self,
        environment: &str,
        ids: &[CodeObjectId],
    ) -> ApiResult<CodeObjectInsight> {
        let body = CodeObjectsRequest {
            environment,
            code_object_ids: ids,
        };
        self.execute(self.client.post(self.url("insights")).json(&body))
            .await
    }

    async fn fetch_errors_for_code_object(
        &self,
        environment: &str,
        id: &CodeObjectId,
    ) -> ApiResult<CodeObjectError> {
        // errors are only recorded against methods
        if id.kind() != Some(CodeObjectKind::Method) {
            tracing::debug!("Skipping error lookup for non-method code object {}", id);
            return Ok(Some(Vec::new()));
        }

        let request = self
            .client
            .get(self.url("errors"))
            .query(&[("environment", environment), ("codeObjectId", id.as_str())]);
        self.execute(request).await
    }
}
