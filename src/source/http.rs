//! Shared HTTP plumbing for every adapter: timeout, pacing, retry.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use super::retry::{retry_async, Pacer, RetryPolicy};
use crate::config::Config;
use crate::logging::log_fetch_failure;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http status {0}")]
    Status(u16),

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(status) => is_retryable_http_error(*status),
            FetchError::Transport(err) => is_retryable_network_error(err),
            // -32005: node is behind / rate limited
            FetchError::Rpc { code, .. } => *code == -32005 || *code == 429,
        }
    }
}

/// Categorize status codes for retry decisions
pub fn is_retryable_http_error(status: u16) -> bool {
    matches!(status,
        408 |   // Request Timeout
        429 |   // Too Many Requests
        500 |   // Internal Server Error
        502 |   // Bad Gateway
        503 |   // Service Unavailable
        504     // Gateway Timeout
    )
}

/// Categorize network errors
pub fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    pacer: Pacer,
}

impl HttpClient {
    pub fn new(retry: RetryPolicy, call_delay_ms: u64, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("chainpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            retry,
            pacer: Pacer::new(call_delay_ms),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.retry.clone(), cfg.call_delay_ms, cfg.request_timeout_secs)
    }

    /// GET returning decoded JSON, retried per policy.
    pub async fn get_json<T, Q>(&self, url: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        retry_async(&self.retry, url, move || self.get_json_once(url, query)).await
    }

    async fn get_json_once<T, Q>(&self, url: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.pacer.pace().await;
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(FetchError::from)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()).into());
        }
        Ok(resp.json::<T>().await.map_err(FetchError::from)?)
    }

    /// Single paced POST attempt. JSON-RPC callers wrap this in
    /// `retry_async` so an error inside a 200 reply can still be retried.
    pub async fn post_json_once<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.pacer.pace().await;
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(FetchError::from)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()).into());
        }
        Ok(resp.json::<T>().await.map_err(FetchError::from)?)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Collapses an exhausted fetch into an absent value, logging the failure.
pub fn absent_on_error<T>(source: &str, identifier: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(err) => {
            log_fetch_failure(source, identifier, &format!("{:#}", err));
            None
        }
    }
}
