//! 📡 The resilient API client: the part of the tool that absorbs the CRM's moods.
//!
//! 🧠 Knowledge graph:
//! - One `ApiClient` per CRM instance (source, destination). Built from an
//!   [`ApiEndpointConfig`] in production, from a [`ScriptedTransport`](crate::backends::ScriptedTransport)
//!   in tests.
//! - `request(method, path, body)` returns parsed JSON or an [`ApiError`]:
//!   - 429 → sleep `Retry-After` (default from config), retry. Unbounded. Never
//!     touches the attempt budget.
//!   - transport failure → sleep `n × backoff_step`, retry until `max_attempts`
//!     failures, then `ApiError::Connection`.
//!   - any other status ≥ 400 → `ApiError::Http` immediately, body truncated.
//!   - empty 2xx body → `{}`.
//!   - cancelled token → `ApiError::Cancelled`, checked before every attempt and
//!     raced against every nap and every GET. Writes already sent are let finish.
//! - ⚠️ Writes are retried like reads. A POST whose response got lost on the wire
//!   will be sent again. Pipelines guard against the duplicates that matter with
//!   content-keyed skips before writing.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app_config::{ApiEndpointConfig, RuntimeConfig};
use crate::backends::{HttpTransport, SleeperBackend, Sleeper, Transport, TransportBackend};
use crate::error::{ApiError, ERROR_BODY_LIMIT, truncate_chars};

/// 🔄 How hard we try before giving up on a request that keeps dying on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for RetryPolicy {
    fn from(runtime: &RuntimeConfig) -> Self {
        Self {
            max_attempts: runtime.max_attempts.max(1),
            backoff_step: Duration::from_secs(runtime.backoff_step_secs),
            default_retry_after: Duration::from_secs(runtime.default_retry_after_secs),
        }
    }
}

/// 📡 Authenticated, retrying JSON client for one CRM instance.
#[derive(Debug)]
pub struct ApiClient {
    label: String,
    transport: TransportBackend,
    sleeper: SleeperBackend,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(
        label: impl Into<String>,
        transport: TransportBackend,
        sleeper: SleeperBackend,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            label: label.into(),
            transport,
            sleeper,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// 🛑 Stop retrying (and stop reading) once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 🚀 Production constructor: reqwest under the hood, tokio's clock for naps.
    pub fn from_endpoint(
        label: impl Into<String>,
        endpoint: &ApiEndpointConfig,
        runtime: &RuntimeConfig,
        sleeper: SleeperBackend,
    ) -> anyhow::Result<Self> {
        let transport =
            HttpTransport::new(endpoint, Duration::from_secs(runtime.request_timeout_secs))?;
        Ok(Self::new(
            label,
            TransportBackend::Http(transport),
            sleeper,
            RetryPolicy::from(runtime),
        ))
    }

    /// 🏷️ "source" or "destination", mostly for log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let mut failed_attempts: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            let outcome = if method == Method::GET {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
                    outcome = self.transport.send(&method, path, body) => outcome,
                }
            } else {
                // -- a write on the wire may already have landed, let the answer come back
                self.transport.send(&method, path, body).await
            };
            match outcome {
                Ok(response) if response.status == 429 => {
                    let wait = response
                        .retry_after
                        .map(Duration::from_secs)
                        .unwrap_or(self.retry.default_retry_after);
                    warn!(
                        "🚦 [{}] rate limited on {} {}, waiting {}s",
                        self.label,
                        method,
                        path,
                        wait.as_secs()
                    );
                    self.nap(wait).await?;
                }
                Ok(response) if response.status >= 400 => {
                    debug!(
                        "💀 [{}] {} {} answered {}",
                        self.label, method, path, response.status
                    );
                    return Err(ApiError::Http {
                        status: response.status,
                        body: truncate_chars(&response.body, ERROR_BODY_LIMIT),
                    });
                }
                Ok(response) => return parse_body(path, &response.body),
                Err(failure) => {
                    failed_attempts += 1;
                    if failed_attempts >= self.retry.max_attempts {
                        return Err(ApiError::Connection {
                            attempts: failed_attempts,
                            message: failure.0,
                        });
                    }
                    let wait = self.retry.backoff_step * failed_attempts;
                    warn!(
                        "🔌 [{}] connection error on {} {}, retrying in {}s ({}/{}): {}",
                        self.label,
                        method,
                        path,
                        wait.as_secs(),
                        failed_attempts,
                        self.retry.max_attempts,
                        failure
                    );
                    self.nap(wait).await?;
                }
            }
        }
    }

    async fn nap(&self, wait: Duration) -> Result<(), ApiError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            _ = self.sleeper.sleep(wait) => Ok(()),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// 🧩 GET and decode into `T`. Shape mismatches become `ApiError::Decode`.
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.get(path).await?;
        decode(path, value)
    }

    /// 🏓 Connectivity check: `/organizations`, falling back to `/clients?limit=1`
    /// for tokens that aren't allowed to list organizations.
    pub async fn ping(&self) -> Result<(), ApiError> {
        match self.get("/organizations").await {
            Ok(organizations) => {
                let count = organizations.as_array().map(Vec::len).unwrap_or(0);
                info!("✅ [{}] connected ({} organization(s))", self.label, count);
                Ok(())
            }
            Err(first_err) => {
                debug!(
                    "🔄 [{}] /organizations failed ({}), trying /clients?limit=1",
                    self.label, first_err
                );
                self.get("/clients?limit=1").await?;
                info!("✅ [{}] connected (verified via clients endpoint)", self.label);
                Ok(())
            }
        }
    }
}

fn parse_body(path: &str, body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(body).map_err(|err| ApiError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|err| ApiError::Decode {
        path: path.to_string(),
        message: err.to_string(),
    })
}
