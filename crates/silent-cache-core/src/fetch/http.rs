//! JSON-over-HTTP fetcher.

use super::Fetcher;
use crate::config::NetworkConfig;
use crate::error::FetchError;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body carried into a `FetchError`.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Fetches a URL with GET and decodes the JSON body into `T`.
///
/// Extra headers are sent with every request, which is how hosted REST
/// backends expect their API key and bearer token.
pub struct JsonFetcher<T> {
    client: Client,
    url: String,
    headers: HeaderMap,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFetcher<T> {
    /// Create a fetcher with the default request timeout.
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(url, NetworkConfig::REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            headers: HeaderMap::new(),
            _marker: PhantomData,
        })
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, FetchError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::Other(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetchError::Other(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<T> Fetcher<T> for JsonFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn fetch(&self) -> BoxFuture<'static, Result<T, FetchError>> {
        let request = self.client.get(&self.url).headers(self.headers.clone());
        let url = self.url.clone();

        async move {
            debug!("GET {}", url);
            let response = request.send().await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    message: if message.is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        message
                    },
                });
            }

            let bytes = response.bytes().await?;
            let value: T = serde_json::from_slice(&bytes)?;
            Ok(value)
        }
        .boxed()
    }
}
