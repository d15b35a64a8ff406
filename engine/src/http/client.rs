//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::EngineError;

/// HTTP client for the records API
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn check(method: &str, url: &str, response: Response) -> Result<Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} {} failed: {} - {}", method, url, status, body);
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound(url.to_string()));
        }
        Err(EngineError::RecordsError(format!("{}: {}", status, body)))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, EngineError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self.authorize(self.client.get(&url).query(query));
        let response = Self::check("GET", &url, request.send().await?).await?;

        let body = response.json().await?;
        Ok(body)
    }

    /// Make a PATCH request. Only the status is checked: the response body,
    /// if any, is ignored.
    pub async fn patch_no_content<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), EngineError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PATCH {}", url);

        let request = self.authorize(self.client.patch(&url).json(body));
        Self::check("PATCH", &url, request.send().await?).await?;
        Ok(())
    }
}
