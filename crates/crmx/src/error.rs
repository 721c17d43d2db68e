//! 💀 Errors: the taxonomy of everything that can go sideways between two CRMs.
//!
//! 🧠 Knowledge graph:
//! - `ApiError`: what the resilient client surfaces after it has finished retrying.
//!   Rate limits and transient network blips never show up here unless the retry
//!   budget ran dry. By the time you hold an `ApiError`, the client already tried.
//! - `RecordError`: the per-record failure vocabulary of the pipelines. Every one of
//!   these is caught at the per-record boundary and turned into a counter plus a
//!   manifest line. None of them stop the batch.
//! - Orchestration and CLI code wraps these in `anyhow` with context, same as the CLI does.
//!
//! 🦆 The duck reviewed this taxonomy and found it adequately pessimistic.

use thiserror::Error;

/// 📏 Max chars of a response body we keep on an `ApiError`. Enough to read the
/// validation message, not enough to paste an HTML error page into the log.
pub(crate) const ERROR_BODY_LIMIT: usize = 500;

/// 📏 Max chars of an error we persist into a failure manifest line.
pub(crate) const MANIFEST_ERROR_LIMIT: usize = 200;

/// 📡 Failures surfaced by [`crate::client::ApiClient`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// 🚫 The server answered with a non-retryable 4xx/5xx. 429 never lands here.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 🔌 Transport kept failing until the retry budget was spent.
    #[error("connection failed after {attempts} attempt(s): {message}")]
    Connection { attempts: u32, message: String },

    /// 🧩 The server said 2xx but the body wasn't the JSON shape we needed.
    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    /// 🛑 Ctrl-C landed before the request (or its retry nap) finished.
    #[error("interrupted")]
    Cancelled,
}

/// 🔗 Which dependency a record could not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    /// No reconciliation entry for this source client id.
    Client(String),
    /// No plan period for this free-text service name.
    Plan(String),
    /// The destination client exists but has no services to patch.
    Service(u64),
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dependency::Client(id) => write!(f, "client {id} not found in destination"),
            Dependency::Plan(name) => write!(f, "no service plan matches '{name}'"),
            Dependency::Service(id) => write!(f, "destination client {id} has no services"),
        }
    }
}

/// 🎯 Per-record failure. Caught at the loop boundary, counted, written down, forgotten.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// 🔗 A foreign key didn't resolve. Skip-and-count territory.
    #[error("dependency missing: {0}")]
    DependencyMissing(Dependency),

    /// 📭 An invoice with zero line items. The destination refuses those, so do we.
    #[error("No items")]
    NoItems,

    /// 🪪 The create call succeeded but the response carried no `id`.
    #[error("no {0} id returned from API")]
    MissingId(&'static str),
}

impl RecordError {
    /// 🛑 Nothing was wrong with the record, the run was stopped under it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RecordError::Api(ApiError::Cancelled))
    }
}

/// ✂️ Cut a string down to `max` chars without slicing through a UTF-8 codepoint.
/// The legacy data is full of ₱ signs. Byte slicing would end in tears.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
