//! # Previously, on crmx...
//!
//! 🎬 The CRM was slow. The CRM was rate limited. The CRM was, on at least one
//! occasion, a Raspberry Pi under someone's desk. Tests could not depend on it.
//!
//! So this module plays the CRM. [`ScriptedTransport`] answers requests from a
//! script you hand it, in order, and writes down every request it was asked to send.
//! [`RecordingSleeper`] pretends to sleep and writes down how long it was asked to.
//! Both clone cheaply and share state behind `Arc<Mutex<...>>` so a test can keep a
//! handle while the client owns the other one.
//!
//! ✅ No network calls. No disk I/O. No waiting sixty seconds for a pretend 429.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::backends::{RawResponse, Sleeper, Transport, TransportFailure};

/// 🎭 One line of the script.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// The server answers.
    Respond(RawResponse),
    /// The request dies on the wire with this message.
    Drop(String),
}

/// 📝 A request the scripted transport was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// 📦 A transport that reads its lines from a script.
///
/// When the script runs out, every further request is dropped with
/// `"script exhausted"`, which surfaces as a connection failure.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<ScriptedReply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    /// ✅ Shorthand for a JSON answer.
    pub fn json(status: u16, body: Value) -> ScriptedReply {
        ScriptedReply::Respond(RawResponse::new(status, body.to_string()))
    }

    /// 🚦 Shorthand for a 429, optionally with `Retry-After`.
    pub fn rate_limited(retry_after: Option<u64>) -> ScriptedReply {
        ScriptedReply::Respond(RawResponse {
            status: 429,
            retry_after,
            body: String::new(),
        })
    }

    /// 🔌 Shorthand for a dropped connection.
    pub fn dropped(message: &str) -> ScriptedReply {
        ScriptedReply::Drop(message.to_string())
    }

    /// 📜 Everything sent so far, in order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportFailure> {
        self.requests.lock().await.push(RecordedRequest {
            method: method.clone(),
            path: path.to_string(),
            body: body.cloned(),
        });
        match self.script.lock().await.pop_front() {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Drop(message)) => Err(TransportFailure(message)),
            None => Err(TransportFailure("script exhausted".to_string())),
        }
    }
}

/// 💤 A sleeper that only pretends. Every requested duration is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    naps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// ⏱️ Every nap requested so far, zero-length pacing naps included.
    pub async fn naps(&self) -> Vec<Duration> {
        self.naps.lock().await.clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.naps.lock().await.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn the_one_where_the_script_is_read_in_order_and_then_runs_dry() {
        let transport = ScriptedTransport::new([
            ScriptedTransport::json(200, json!([1, 2])),
            ScriptedTransport::dropped("reset by peer"),
        ]);

        let first = transport.send(&Method::GET, "/clients", None).await;
        let second = transport.send(&Method::GET, "/clients", None).await;
        let third = transport.send(&Method::GET, "/clients", None).await;

        assert_eq!(first.map(|r| r.status), Ok(200));
        assert_eq!(second, Err(TransportFailure("reset by peer".into())));
        assert_eq!(third, Err(TransportFailure("script exhausted".into())));
        assert_eq!(transport.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_clones_share_one_notebook() {
        let sleeper = RecordingSleeper::new();
        let the_twin = sleeper.clone();
        the_twin.sleep(Duration::from_secs(2)).await;
        assert_eq!(sleeper.naps().await, vec![Duration::from_secs(2)]);
    }
}
