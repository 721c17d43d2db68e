//! # 📡 THE HTTP TRANSPORT
//!
//! 🎬 INT. SERVER ROOM, 11:58 PM, the old CRM's license expires at midnight.
//!
//! This is the only file in the crate that actually talks to a network. It builds
//! one `reqwest::Client` per endpoint, stamps the app key on every request, and
//! reports back exactly what the server said. Retrying is somebody else's job.
//!
//! ⚠️ Self-signed certificates are accepted unless `verify_tls = true`. The CRM
//! boxes this tool was written for ship with a cert nobody ever replaced.
//!
//! 🦆

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;
use tracing::trace;

use crate::app_config::ApiEndpointConfig;
use crate::backends::{RawResponse, Transport, TransportFailure};

/// 🔒 The CRM's auth header. One key, one header, no OAuth dance.
const APP_KEY_HEADER: &str = "x-auth-app-key";

/// 🧭 Every endpoint hangs off this prefix.
pub(crate) const API_PREFIX: &str = "/crm/api/v1.0";

/// 📡 reqwest-backed [`Transport`] bound to one CRM instance.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_root: String,
}

impl HttpTransport {
    /// 🚀 Build the client for one endpoint. Fails only if the token can't be a header
    /// value or the TLS stack refuses to initialize.
    pub fn new(endpoint: &ApiEndpointConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut app_key = HeaderValue::from_str(endpoint.token.trim()).context(
            "💀 The API token contains characters that can't live in an HTTP header. \
             Check for stray newlines or quotes around the token in your config.",
        )?;
        app_key.set_sensitive(true);
        headers.insert(HeaderName::from_static(APP_KEY_HEADER), app_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .danger_accept_invalid_certs(!endpoint.verify_tls)
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS backend. Either way: tragic.")?;

        Ok(Self {
            client,
            api_root: api_root(&endpoint.base_url),
        })
    }
}

/// `https://crm.example.com/` → `https://crm.example.com/crm/api/v1.0`
pub(crate) fn api_root(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), API_PREFIX)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, TransportFailure> {
        let url = format!("{}{}", self.api_root, path);
        trace!("📡 {} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(payload) = body {
            let bytes = serde_json::to_vec(payload)
                .map_err(|err| TransportFailure(format!("could not encode request body: {err}")))?;
            request = request.body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportFailure(describe_reqwest_error(&err)))?;

        let status = response.status().as_u16();
        // -- Retry-After may also be an HTTP date. The CRM only ever sends seconds.
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|err| TransportFailure(describe_reqwest_error(&err)))?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// 🧅 reqwest's Display stops at the outermost layer ("error sending request").
/// Walk the source chain so the log says "tcp connect error: Connection refused".
fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
