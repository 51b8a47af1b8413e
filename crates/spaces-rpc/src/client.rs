//! HTTP JSON-RPC client backed by `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::retry::{RetryConfig, RetryPolicy};

/// Configuration for [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    /// HTTP basic-auth credentials (`rpcuser` / `rpcpassword`).
    pub auth: Option<(String, String)>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            auth: None,
        }
    }
}

/// JSON-RPC client for a single endpoint, with retry on transient errors.
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    auth: Option<(String, String)>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, config: RpcClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Setup(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            auth: config.auth,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its result as `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::UnexpectedResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Call `method` and return its raw result.
    pub async fn call_raw(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return resp.into_result().map_err(RpcError::Rpc),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            url = %self.url,
                            method,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, RpcError> {
        let mut builder = self.http.post(&self.url).json(req);
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        // Bitcoin Core reports RPC errors with HTTP 404/500 and a JSON body.
        if let Ok(parsed) = serde_json::from_str::<JsonRpcResponse>(&body) {
            if status.is_success() || parsed.error.is_some() {
                return Ok(parsed);
            }
        }

        if !status.is_success() {
            return Err(RpcError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }
        Err(RpcError::UnexpectedResponse {
            method: req.method.clone(),
            reason: format!("not a JSON-RPC response: {body}"),
        })
    }
}
