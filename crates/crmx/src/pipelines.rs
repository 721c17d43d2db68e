//! 🚚 Pipelines: the four batch drivers, and the plumbing they share.
//!
//! 🧠 Knowledge graph:
//! - One module per entity: [`clients`] (CSV → destination, plus `list-plans`),
//!   [`services`] (source export), [`invoices`] (export → import with payments),
//!   [`pppoe`] (source attribute → destination service patch).
//! - Every pipeline follows the same shape:
//!   1. connect + ping the endpoints it needs,
//!   2. discovery: build the immutable lookups (plans, client map, service index).
//!      Any failure here is fatal, nothing downstream can run without them,
//!   3. one record at a time, in source order: resolve, transform, write. A record's
//!      failure is counted and written to the manifest, never propagated,
//!   4. summary table + failure manifest, also after Ctrl-C.
//! - [`PipelineContext`] carries the config, the command-line knobs, the Ctrl-C
//!   token, and the sleeper used for pacing and retries. Every client it connects
//!   shares the token, so exports stop between pages and retry naps end early.
//!
//! ⚠️ Writes are not idempotent. Re-runs lean on the content-keyed skips (existing
//! `userIdent`, existing invoice number, PPPoE already set) and on `--resume-from`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app_config::{ApiEndpointConfig, AppConfig};
use crate::backends::{Sleeper, SleeperBackend};
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::pagination::{PageRequest, Paginator};

pub mod clients;
pub mod invoices;
pub mod pppoe;
pub mod services;

/// 🎛️ What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Import clients and their services from the legacy CSV export.
    Clients { csv: PathBuf },
    /// Print the destination plan catalog.
    ListPlans,
    /// Export service plans and client services from the source.
    ExportServices { skip_plans: bool },
    /// Export invoices from the source (or load a snapshot) and import them.
    Invoices {
        export_only: bool,
        import_from: Option<PathBuf>,
    },
    /// Copy PPPoE usernames onto destination services.
    Pppoe,
}

impl Command {
    /// 🏷️ Short name for log files and banners.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Clients { .. } => "import_clients",
            Command::ListPlans => "list_plans",
            Command::ExportServices { .. } => "export_services",
            Command::Invoices { .. } => "import_invoices",
            Command::Pppoe => "import_pppoe",
        }
    }
}

/// 🎚️ Flags shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Small batch: the command's test size, or `runtime.test_limit` if set.
    pub test: bool,
    /// Explicit cap on records. Wins over `test`.
    pub limit: Option<usize>,
    /// Start offset for source exports (`--offset`).
    pub offset: usize,
    /// Skip this many records of the processing list (`--resume-from`).
    pub resume_from: usize,
    /// Compute and report, write nothing.
    pub dry_run: bool,
}

/// 🧳 Everything a pipeline run carries around.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub app_config: AppConfig,
    pub options: RunOptions,
    pub cancel: CancellationToken,
    pub sleeper: SleeperBackend,
}

impl PipelineContext {
    pub fn new(app_config: AppConfig, options: RunOptions) -> Self {
        Self {
            app_config,
            options,
            cancel: CancellationToken::new(),
            sleeper: SleeperBackend::Tokio,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_sleeper(mut self, sleeper: SleeperBackend) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// 📏 The record cap for this run. `test_size` is the command's small-batch default.
    pub fn limit(&self, test_size: usize) -> Option<usize> {
        self.options.limit.or_else(|| {
            self.options
                .test
                .then(|| self.app_config.runtime.test_limit.unwrap_or(test_size))
        })
    }

    pub(crate) fn artifact(&self, file_name: &str) -> PathBuf {
        self.app_config.runtime.artifacts_dir.join(file_name)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 💤 The breather between writes. Ends early on Ctrl-C.
    pub(crate) async fn pace(&self) {
        let delay = Duration::from_millis(self.app_config.runtime.pacing_delay_ms);
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.sleeper.sleep(delay) => {}
        }
    }

    pub async fn connect_source(&self) -> Result<ApiClient> {
        self.connect("source", self.app_config.source()?).await
    }

    pub async fn connect_destination(&self) -> Result<ApiClient> {
        self.connect("destination", self.app_config.destination()?).await
    }

    async fn connect(&self, label: &str, endpoint: &ApiEndpointConfig) -> Result<ApiClient> {
        let client = ApiClient::from_endpoint(
            label,
            endpoint,
            &self.app_config.runtime,
            self.sleeper.clone(),
        )?
        .with_cancel(self.cancel.clone());
        match client.ping().await {
            Ok(()) => Ok(client),
            Err(ApiError::Cancelled) => bail!("🛑 Interrupted while connecting to the {label} CRM"),
            Err(err) => Err(err).with_context(|| {
                format!(
                    "💀 Cannot connect to the {} CRM at '{}'. Check base_url and token.",
                    label, endpoint.base_url
                )
            }),
        }
    }
}

/// 📦 A partial-tolerant export: whatever was fetched, plus where to resume if a page failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub records: Vec<Value>,
    pub resume_offset: Option<usize>,
}

/// 📚 Page through `endpoint`, keeping what arrived even if a later page fails
/// or Ctrl-C lands between pages.
pub(crate) async fn export_collection(
    client: &ApiClient,
    endpoint: &str,
    request: PageRequest,
) -> Export {
    let mut paginator = Paginator::new(client, endpoint, request);
    let mut records = Vec::new();
    loop {
        let offset = paginator.offset();
        match paginator.next_page().await {
            Ok(Some(page)) => {
                records.extend(page.records);
                info!(
                    "📚 {}: {} exported (next offset {})",
                    endpoint,
                    records.len(),
                    page.next_offset
                );
            }
            Ok(None) => {
                return Export {
                    records,
                    resume_offset: None,
                };
            }
            Err(ApiError::Cancelled) => {
                warn!(
                    "🛑 {} export interrupted. Keeping {} records. Resume with --offset {}",
                    endpoint,
                    records.len(),
                    offset
                );
                return Export {
                    records,
                    resume_offset: Some(offset),
                };
            }
            Err(err) => {
                error!("💀 Failed to fetch {} at offset {}: {}", endpoint, offset, err);
                warn!(
                    "💾 Keeping {} records fetched so far. Resume with --offset {}",
                    records.len(),
                    offset
                );
                return Export {
                    records,
                    resume_offset: Some(offset),
                };
            }
        }
    }
}
