//! Shared HTTP plumbing for provider clients

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::{Error, ProviderError, Result};
use crate::provider::ProviderKind;

/// Thin JSON-over-HTTP client that classifies failures
pub struct HttpFetcher {
    client: Client,
    provider: ProviderKind,
    bearer: Option<String>,
}

impl HttpFetcher {
    pub fn new(provider: ProviderKind, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("team-holdings/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            bearer: None,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request
    pub fn with_bearer(mut self, token: String) -> Self {
        self.bearer = Some(token);
        self
    }

    /// Build a URL with query parameters
    pub fn url(&self, base: &str, params: &[(&str, String)]) -> std::result::Result<Url, ProviderError> {
        Url::parse_with_params(base, params)
            .map_err(|e| ProviderError::malformed(self.provider, format!("invalid URL {}: {}", base, e)))
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<T, ProviderError> {
        debug!("{} GET {}", self.provider, mask_query(&url));

        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.provider, status, body, retry_after));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::malformed(self.provider, format!("failed to decode body: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                provider: self.provider,
            }
        } else {
            ProviderError::Network {
                provider: self.provider,
                message: e.to_string(),
            }
        }
    }
}

/// Map a non-success status to the retryable or permanent error kind
pub fn classify_status(
    provider: ProviderKind,
    status: StatusCode,
    body: String,
    retry_after: Option<Duration>,
) -> ProviderError {
    let body: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited {
            provider,
            retry_after,
        }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        ProviderError::Server {
            provider,
            status: status.as_u16(),
            body,
        }
    } else {
        ProviderError::Client {
            provider,
            status: status.as_u16(),
            body,
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Hide query values that may carry API keys
pub fn mask_query(url: &Url) -> String {
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let lower = k.to_ascii_lowercase();
            let v = if lower.contains("key") { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if pairs.is_empty() {
        return masked.to_string();
    }
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
