//! reqwest-backed [`ContentApi`] implementation

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::ContentApi;
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{
    CourseProgress, Entity, EntityId, EntityUpdate, MarkRequest, MarkResponse, ProgressRecord,
};

/// Content API client over HTTP
///
/// GET requests are retried on transient failures according to [`RetryConfig`];
/// DELETE, PUT and POST requests are sent exactly once.
#[derive(Clone)]
pub struct HttpContentApi {
    /// Shared HTTP client (connection pool)
    client: Client,
    /// Base URL, always ending in `/` so relative joins append
    base_url: Url,
    /// Bearer credential from the host environment
    auth_token: Option<String>,
    /// Retry policy for reads
    retry: RetryConfig,
}

impl HttpContentApi {
    /// Create a client from configuration
    ///
    /// # Errors
    /// Returns a configuration error if the settings are invalid or the HTTP
    /// client cannot be created.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut base_url = Url::parse(&config.api.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.api.timeout)
            .user_agent(config.api.user_agent.as_str())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth_token: config.api.auth_token.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET with retry on transient failures
    async fn read<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        with_retry(&self.retry, || {
            let request = self.authorize(self.client.get(url.clone()));
            execute(request, url.as_str())
        })
        .await
    }

    /// Single-shot mutation
    async fn write<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
        execute(self.authorize(request), url.as_str()).await
    }
}

/// Send a request and decode a successful JSON body
///
/// An empty success body (`204 No Content` or a bare `200`) decodes as JSON `null`.
async fn execute<T: DeserializeOwned>(request: RequestBuilder, url: &str) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(url = %url, status = status.as_u16(), "content API request failed");
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn get_entity(&self, id: EntityId) -> Result<Entity> {
        let url = self.endpoint(&format!("entities/{id}"))?;
        self.read(url).await
    }

    async fn delete_entity(&self, id: EntityId) -> Result<Value> {
        let url = self.endpoint(&format!("entities/{id}"))?;
        self.write(self.client.delete(url.clone()), &url).await
    }

    async fn update_entity(&self, id: EntityId, update: &EntityUpdate) -> Result<Entity> {
        let url = self.endpoint(&format!("entities/{id}"))?;
        self.write(self.client.put(url.clone()).json(update), &url)
            .await
    }

    async fn mark_complete(&self, request: &MarkRequest) -> Result<MarkResponse> {
        let url = self.endpoint("progress/mark")?;
        self.write(self.client.post(url.clone()).json(request), &url)
            .await
    }

    async fn unmark_complete(&self, request: &MarkRequest) -> Result<MarkResponse> {
        let url = self.endpoint("progress/unmark")?;
        self.write(self.client.post(url.clone()).json(request), &url)
            .await
    }

    async fn get_progress(&self, course_id: i64) -> Result<CourseProgress> {
        let url = self.endpoint(&format!("progress/{course_id}"))?;
        self.read(url).await
    }

    async fn get_completed(&self, course_id: i64) -> Result<Vec<ProgressRecord>> {
        let url = self.endpoint(&format!("progress/{course_id}/completed"))?;
        self.read(url).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn api_for(base_url: &str) -> HttpContentApi {
        let mut config = Config::default();
        config.api.base_url = base_url.to_string();
        HttpContentApi::new(&config).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let api = api_for("https://lms.example.com/wp-json/lms/v1");
        assert_eq!(api.base_url().as_str(), "https://lms.example.com/wp-json/lms/v1/");
    }

    #[test]
    fn endpoints_are_joined_under_base_path() {
        let api = api_for("https://lms.example.com/api/");
        assert_eq!(
            api.endpoint("entities/7").unwrap().as_str(),
            "https://lms.example.com/api/entities/7"
        );
        assert_eq!(
            api.endpoint("progress/3/completed").unwrap().as_str(),
            "https://lms.example.com/api/progress/3/completed"
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.batch.width = 0;
        assert!(matches!(
            HttpContentApi::new(&config),
            Err(Error::Config { .. })
        ));
    }
}
