//! 🚚 crmx: move clients, services, invoices and PPPoE credentials from one CRM
//! instance to another before the old one goes dark.
//!
//! 🧠 Knowledge graph:
//! - [`client`]: retrying, rate-limit-aware HTTP client. Everything talks through it.
//! - [`pagination`]: `limit`/`offset` walking on top of the client.
//! - [`plans`], [`reconciliation`]: the lookups built once per run (plan catalog,
//!   client id map, service index).
//! - [`transforms`]: pure record → payload mapping.
//! - [`pipelines`]: one batch driver per entity, sharing a [`pipelines::PipelineContext`].
//!
//! 🦆 Still here.

use anyhow::Result;

use crate::app_config::AppConfig;
use crate::pipelines::{Command, PipelineContext, RunOptions};

pub mod app_config;
pub mod backends;
pub mod client;
pub mod common;
pub mod error;
pub mod pagination;
pub mod pipelines;
pub mod plans;
mod progress;
pub mod reconciliation;
pub mod report;
pub mod shutdown;
pub mod transforms;

/// 🚀 Run one command to completion. Ctrl-C stops record loops, page walks and retry
/// naps; the summary and failure manifest still get written.
pub async fn run(app_config: AppConfig, command: Command, options: RunOptions) -> Result<()> {
    let ctx = PipelineContext::new(app_config, options).with_cancel(shutdown::cancel_on_ctrl_c());
    match command {
        Command::Clients { csv } => pipelines::clients::run(&ctx, &csv).await.map(|_| ()),
        Command::ListPlans => pipelines::clients::list_plans(&ctx).await.map(|_| ()),
        Command::ExportServices { skip_plans } => {
            pipelines::services::run(&ctx, skip_plans).await.map(|_| ())
        }
        Command::Invoices {
            export_only,
            import_from,
        } => pipelines::invoices::run(&ctx, export_only, import_from.as_deref()).await,
        Command::Pppoe => pipelines::pppoe::run(&ctx).await,
    }
}
