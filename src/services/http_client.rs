use crate::services::cache::{CacheGateway, CacheRead};
use crate::services::retry::{retry_with_policy, RetryPolicy};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response body from {url}: {reason}")]
    Body { url: String, reason: String },
}

impl HttpError {
    /// Network-level failures and server errors are retried; client errors and
    /// undecodable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => {
                !source.is_builder()
                    && !source.is_decode()
                    && (source.is_timeout()
                        || source.is_connect()
                        || source.is_request()
                        || source.is_body())
            }
            Self::Status { status, .. } => *status >= 500,
            Self::Build(_) | Self::Body { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outbound JSON client with bounded retry and an optional `cache:<url>` response cache.
pub struct ResilientClient {
    client: Client,
    policy: RetryPolicy,
    response_cache: Option<CacheGateway>,
}

impl ResilientClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(HttpError::Build)?;

        Ok(Self {
            client,
            policy,
            response_cache: None,
        })
    }

    /// Serve successful GET bodies from `cache` for the cache TTL.
    pub fn with_response_cache(mut self, cache: CacheGateway) -> Self {
        self.response_cache = Some(cache);
        self
    }

    /// GETs `url` and decodes the body as JSON. Any non-2xx status is an error.
    pub async fn get_json(&self, url: &str) -> Result<Value, HttpError> {
        let cache_key = CacheGateway::url_key(url);
        if let Some(cache) = &self.response_cache {
            if let CacheRead::Hit(body) = cache.read::<Value>(&cache_key).await {
                debug!(url, "serving response from cache");
                return Ok(body);
            }
        }

        let body = retry_with_policy(
            &self.policy,
            url,
            || self.get_once(url),
            HttpError::is_retryable,
        )
        .await?;

        if let Some(cache) = &self.response_cache {
            cache.write(&cache_key, &body).await;
        }
        Ok(body)
    }

    async fn get_once(&self, url: &str) -> Result<Value, HttpError> {
        let transport = |source| HttpError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&bytes).map_err(|e| HttpError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_classification() {
        let status = |status| HttpError::Status {
            url: "http://catalog/1".into(),
            status,
        };
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert_eq!(status(404).status(), Some(404));

        let body = HttpError::Body {
            url: "http://catalog/1".into(),
            reason: "EOF".into(),
        };
        assert!(!body.is_retryable());
        assert_eq!(body.status(), None);
    }
}
