//! 👤 Clients: legacy CSV → destination clients, each followed by its services.
//!
//! The client's legacy id goes out as `userIdent`. Every later pipeline joins on it,
//! so a client whose id is already on the destination is skipped, not recreated.
//! Services need a plan period id from the [`PlanCatalog`]; a service whose name
//! matches no plan is counted, remembered, and left out.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::backends::csv_clients::read_legacy_clients;
use crate::client::ApiClient;
use crate::common::{LegacyClient, LegacyService};
use crate::error::{Dependency, RecordError};
use crate::pipelines::PipelineContext;
use crate::plans::PlanCatalog;
use crate::progress::ProgressMetrics;
use crate::reconciliation::{ClientIdMap, discover_client_map};
use crate::report::{FailureLog, Summary, manifest_error};
use crate::transforms::clients::{client_payload, service_payload};

const TEST_SIZE: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub clients_created: usize,
    pub clients_failed: usize,
    pub clients_skipped_existing: usize,
    pub services_created: usize,
    pub services_failed: usize,
    pub services_no_plan: usize,
    pub interrupted: bool,
    /// 🛑 Set when interrupted: the `--resume-from` value that picks up the first client not attempted.
    pub resume_at: Option<usize>,
}

/// 📒 One manifest line. `service` is set when the client went through but a service didn't.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedClient {
    pub original_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ClientImport {
    pub stats: ClientStats,
    /// Service names no plan matched, sorted and deduplicated.
    pub unmatched_plans: BTreeSet<String>,
    pub failures: FailureLog<FailedClient>,
}

impl ClientImport {
    pub fn summary(&self) -> Summary {
        let stats = &self.stats;
        Summary::new("👤 CLIENT IMPORT SUMMARY")
            .row("Clients created", stats.clients_created)
            .row("Clients failed", stats.clients_failed)
            .row("Clients skipped (already imported)", stats.clients_skipped_existing)
            .row("Services created", stats.services_created)
            .row("Services failed", stats.services_failed)
            .row("Services (no plan)", stats.services_no_plan)
            .rows(
                stats
                    .resume_at
                    .map(|position| ("Resume with --resume-from", position)),
            )
            .rows(
                self.unmatched_plans
                    .iter()
                    .map(|plan| (format!("  unmatched plan: {plan}"), "needs creating")),
            )
    }
}

/// 🚀 The whole `clients` command. Hands back whatever it logged last: the dry-run
/// report or the import summary.
pub async fn run(ctx: &PipelineContext, csv: &Path) -> Result<Summary> {
    let mapping = &ctx.app_config.mapping;
    let parsed = read_legacy_clients(csv, &mapping.utc_offset).await?;
    let clients = select(parsed, ctx.options.resume_from, ctx.limit(TEST_SIZE));
    info!("👤 Importing {} clients", clients.len());

    if ctx.options.dry_run {
        info!("🧪 DRY RUN: no API calls will be made");
        let report = dry_run_report(&clients);
        report.log();
        return Ok(report);
    }

    let destination = ctx.connect_destination().await?;
    let plans = PlanCatalog::discover(&destination, mapping.plan_match)
        .await
        .context("💀 Couldn't fetch service plans. Create them on the destination first.")?;
    let existing = discover_client_map(&destination, ctx.app_config.runtime.discovery_page_size)
        .await
        .context("💀 Couldn't scan destination clients for already-imported ids")?;

    let import = import_clients(&destination, &clients, &plans, &existing, ctx).await;
    let summary = import.summary();
    summary.log();
    import
        .failures
        .persist(&ctx.app_config.runtime.artifacts_dir)
        .await?;
    Ok(summary)
}

/// 📋 The `list-plans` command: every lookup key and the period id it resolves to.
pub async fn list_plans(ctx: &PipelineContext) -> Result<Summary> {
    let destination = ctx.connect_destination().await?;
    let catalog = PlanCatalog::discover(&destination, ctx.app_config.mapping.plan_match)
        .await
        .context("💀 Couldn't fetch service plans")?;
    let mut entries: Vec<(&str, u64)> = catalog.entries().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let summary = Summary::new(format!("📋 Available service plans ({})", entries.len()))
        .rows(entries.into_iter().map(|(name, period_id)| (name.to_string(), period_id)));
    summary.log();
    Ok(summary)
}

/// ✂️ Skip the first `start`, keep at most `limit`.
pub fn select(
    clients: Vec<LegacyClient>,
    start: usize,
    limit: Option<usize>,
) -> Vec<LegacyClient> {
    clients
        .into_iter()
        .skip(start)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// 🧪 Totals, services per plan (busiest first), and a sample client.
pub fn dry_run_report(clients: &[LegacyClient]) -> Summary {
    let mut by_plan: BTreeMap<&str, usize> = BTreeMap::new();
    for service in clients.iter().flat_map(|client| &client.services) {
        *by_plan.entry(service.name.as_str()).or_default() += 1;
    }
    let total_services: usize = by_plan.values().sum();
    let mut by_plan: Vec<(&str, usize)> = by_plan.into_iter().collect();
    by_plan.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut summary = Summary::new("🧪 DRY RUN REPORT")
        .row("Total clients to import", clients.len())
        .row("Total services to import", total_services)
        .rows(
            by_plan
                .into_iter()
                .map(|(plan, count)| (format!("  {plan}"), count)),
        );
    if let Some(sample) = clients.first() {
        let email = if sample.email.is_empty() {
            "N/A"
        } else {
            sample.email.as_str()
        };
        summary = summary
            .row("Sample client", sample.full_name())
            .row("  Email", email)
            .row("  Address", format!("{}, {}", sample.street1, sample.city))
            .row("  Services", sample.services.len())
            .rows(
                sample
                    .services
                    .iter()
                    .map(|service| ("    -".to_string(), service.name.clone())),
            );
    }
    summary
}

/// 🔁 The per-client loop.
pub async fn import_clients(
    destination: &ApiClient,
    clients: &[LegacyClient],
    plans: &PlanCatalog,
    existing: &ClientIdMap,
    ctx: &PipelineContext,
) -> ClientImport {
    let mut import = ClientImport {
        stats: ClientStats::default(),
        unmatched_plans: BTreeSet::new(),
        failures: FailureLog::new("clients"),
    };
    let mut progress = ProgressMetrics::new(
        "clients",
        clients.len() as u64,
        ctx.app_config.runtime.progress_every,
    );

    for (index, client) in clients.iter().enumerate() {
        if ctx.stop_requested() {
            interrupted_at(&mut import.stats, ctx.options.resume_from + index);
            break;
        }
        if existing.contains(&client.original_id) {
            import.stats.clients_skipped_existing += 1;
            debug!("⏭️ Client {} already on the destination", client.original_id);
            progress.record();
            continue;
        }

        match create_client(destination, client, ctx).await {
            Ok(client_id) => {
                import.stats.clients_created += 1;
                debug!("✅ Created client {} → {}", client.original_id, client_id);
                for service in &client.services {
                    import_service(destination, client, client_id, service, plans, &mut import)
                        .await;
                }
            }
            Err(err) if err.is_cancelled() => {
                interrupted_at(&mut import.stats, ctx.options.resume_from + index);
                break;
            }
            Err(err) => {
                import.stats.clients_failed += 1;
                error!("💀 Failed to import client {}: {}", client.original_id, err);
                import.failures.push(FailedClient {
                    original_id: client.original_id.clone(),
                    name: client.full_name(),
                    service: None,
                    error: manifest_error(&err),
                });
            }
        }
        progress.record();
        ctx.pace().await;
    }
    progress.finish();
    import
}

fn interrupted_at(stats: &mut ClientStats, position: usize) {
    stats.interrupted = true;
    stats.resume_at = Some(position);
    info!("🛑 Import interrupted. Resume with --resume-from {}", position);
}

async fn create_client(
    destination: &ApiClient,
    client: &LegacyClient,
    ctx: &PipelineContext,
) -> Result<u64, RecordError> {
    let payload = client_payload(client, &ctx.app_config.mapping);
    let created = destination.post("/clients", &payload).await?;
    created
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(RecordError::MissingId("client"))
}

async fn import_service(
    destination: &ApiClient,
    client: &LegacyClient,
    client_id: u64,
    service: &LegacyService,
    plans: &PlanCatalog,
    import: &mut ClientImport,
) {
    match create_service(destination, client_id, service, plans).await {
        Ok(()) => import.stats.services_created += 1,
        Err(RecordError::DependencyMissing(missing)) => {
            import.stats.services_no_plan += 1;
            import.unmatched_plans.insert(service.name.clone());
            warn!("⚠️ {}", missing);
        }
        Err(err) => {
            import.stats.services_failed += 1;
            warn!("⚠️ Failed to create service '{}': {}", service.name, err);
            import.failures.push(FailedClient {
                original_id: client.original_id.clone(),
                name: client.full_name(),
                service: Some(service.name.clone()),
                error: manifest_error(&err),
            });
        }
    }
}

async fn create_service(
    destination: &ApiClient,
    client_id: u64,
    service: &LegacyService,
    plans: &PlanCatalog,
) -> Result<(), RecordError> {
    let period_id = plans.resolve(&service.name).ok_or_else(|| {
        RecordError::DependencyMissing(Dependency::Plan(service.name.clone()))
    })?;
    let payload = service_payload(service, period_id);
    debug!("🛠️ Creating service {} (period {})", service.name, period_id);
    destination
        .post(&format!("/clients/{client_id}/services"), &payload)
        .await?;
    Ok(())
}
