//! 🔌 Backends: where the real I/O happens.
//!
//! 📡 Two seams live here, both dispatched through enums the same way the old
//! source/sink casting agency did it:
//!
//! - [`Transport`]: moves one HTTP request to a CRM and brings back whatever
//!   came home. No retries, no opinions. [`crate::client::ApiClient`] owns the opinions.
//! - [`Sleeper`]: waits. Rate limits, backoff, pacing between records. Tests
//!   swap in a recording sleeper so nobody has to wait sixty real seconds for a 429.
//!
//! Plus the file-ish collaborators: the legacy CSV reader and the JSON snapshot
//! writer. They don't need a trait. They need a path.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

pub mod csv_clients;
pub mod http;
pub mod in_mem;
pub mod snapshot;

pub use http::HttpTransport;
pub use in_mem::{RecordedRequest, RecordingSleeper, ScriptedReply, ScriptedTransport};

/// 📦 What a transport hands back: the status, the parsed `Retry-After`
/// (seconds, if the server bothered), and the body as text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// 🔌 The request never got an answer. DNS, TCP, TLS, timeout: all of it lands here
/// and all of it is considered transient by the client.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct TransportFailure(pub String);

// ===== Transport Trait and Backend Enum =====

/// 📡 Sends one request. `path` is relative to the API root (`/clients?limit=1`).
///
/// # Contract
/// - Any HTTP answer, including 4xx/5xx/429, is `Ok(RawResponse)`.
/// - `Err` means the request did not complete and may be retried.
#[async_trait]
pub trait Transport: std::fmt::Debug {
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportFailure>;
}

/// 🎭 The many faces of a Transport. Real HTTP in production, a script in tests.
#[derive(Debug)]
pub enum TransportBackend {
    Http(HttpTransport),
    Scripted(ScriptedTransport),
}

#[async_trait]
impl Transport for TransportBackend {
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportFailure> {
        match self {
            TransportBackend::Http(http) => http.send(method, path, body).await,
            TransportBackend::Scripted(scripted) => scripted.send(method, path, body).await,
        }
    }
}

// ===== Sleeper Trait and Backend Enum =====

/// 💤 Something that can wait.
#[async_trait]
pub trait Sleeper: std::fmt::Debug {
    async fn sleep(&self, duration: Duration);
}

/// 🎭 Tokio's clock for real runs; a notebook of requested naps for tests.
#[derive(Debug, Clone, Default)]
pub enum SleeperBackend {
    #[default]
    Tokio,
    Recording(RecordingSleeper),
}

#[async_trait]
impl Sleeper for SleeperBackend {
    async fn sleep(&self, duration: Duration) {
        match self {
            SleeperBackend::Tokio => {
                if !duration.is_zero() {
                    tokio::time::sleep(duration).await;
                }
            }
            SleeperBackend::Recording(recorder) => recorder.sleep(duration).await,
        }
    }
}
