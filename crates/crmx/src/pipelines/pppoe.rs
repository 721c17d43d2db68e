//! 🔑 PPPoE: copy the username from a source client attribute onto every service
//! its reconciled destination client owns.
//!
//! Planning is pure and happens up front: source client → destination client →
//! services, dropping anything already carrying a value. Only then do we start
//! patching, one service at a time.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::client::ApiClient;
use crate::common::{SourceClient, attribute_value};
use crate::error::{ApiError, Dependency, RecordError};
use crate::pagination::{PageRequest, fetch_all_as};
use crate::pipelines::PipelineContext;
use crate::progress::ProgressMetrics;
use crate::reconciliation::{
    ClientIdMap, ServiceIndex, ServiceSummary, discover_client_map, discover_service_index,
};
use crate::report::{FailureLog, Summary, manifest_error};
use crate::transforms::pppoe::pppoe_patch;

const TEST_SIZE: usize = 5;
const DRY_RUN_PREVIEW: usize = 20;

/// 🛠️ One PATCH waiting to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub service_id: u64,
    pub service_name: String,
    pub pppoe_username: String,
    pub source_client_id: String,
}

/// 📊 What planning saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanningStats {
    /// Source clients with a non-blank username.
    pub available: usize,
    pub matched_client: usize,
    pub skipped_no_client: usize,
    pub skipped_no_service: usize,
    /// Counted per service, not per client.
    pub skipped_already_set: usize,
    pub multi_service_clients: usize,
    pub work: usize,
}

impl PlanningStats {
    pub fn summary(&self) -> Summary {
        Summary::new("🔑 PPPOE PLANNING")
            .row("Clients with PPPoE username", self.available)
            .row("Matched to a destination client", self.matched_client)
            .row("Skipped (no destination client)", self.skipped_no_client)
            .row("Skipped (no services)", self.skipped_no_service)
            .row("Services skipped (already set)", self.skipped_already_set)
            .row("Clients with multiple services", self.multi_service_clients)
            .row("Services to update", self.work)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPlan {
    pub items: Vec<WorkItem>,
    pub stats: PlanningStats,
}

/// 📊 What applying saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub updated: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl PatchStats {
    pub fn summary(&self) -> Summary {
        Summary::new("🔑 PPPOE UPDATE SUMMARY")
            .row("Services updated", self.updated)
            .row("Services failed", self.failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPatch {
    pub service_id: u64,
    pub pppoe: String,
    pub old_client_id: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct PppoeUpdate {
    pub stats: PatchStats,
    pub failures: FailureLog<FailedPatch>,
}

/// 🚀 The whole `pppoe` command.
pub async fn run(ctx: &PipelineContext) -> Result<()> {
    let source = ctx.connect_source().await?;
    let destination = ctx.connect_destination().await?;
    let page_size = ctx.app_config.runtime.discovery_page_size;
    let mapping = &ctx.app_config.mapping;

    info!("📡 Scanning source clients for PPPoE usernames");
    let source_clients: Vec<SourceClient> =
        fetch_all_as(&source, "/clients", PageRequest::all(page_size))
            .await
            .context("💀 Couldn't scan source clients")?;
    let usernames = collect_pppoe_usernames(&source_clients, mapping.source_pppoe_attribute_id);
    info!(
        "🔑 {} of {} source clients carry a PPPoE username",
        usernames.len(),
        source_clients.len()
    );

    let client_map = discover_client_map(&destination, page_size)
        .await
        .context("💀 Couldn't build the client id map")?;
    let services = discover_service_index(&destination, page_size)
        .await
        .context("💀 Couldn't build the service index")?;

    let mut plan = plan_work(
        &usernames,
        &client_map,
        &services,
        mapping.destination_pppoe_attribute_id,
    );
    plan.stats.summary().log();
    if let Some(limit) = ctx.limit(TEST_SIZE) {
        plan.items.truncate(limit);
    }

    if ctx.options.dry_run {
        dry_run_preview(&plan.items).log();
        return Ok(());
    }

    let update = apply(&destination, &plan.items, ctx).await;
    update.stats.summary().log();
    if let Some(path) = update
        .failures
        .persist(&ctx.app_config.runtime.artifacts_dir)
        .await?
    {
        info!("📒 {} failed updates written to {}", update.failures.len(), path.display());
    }
    Ok(())
}

/// 🔍 `(source client id, username)` for every client with a non-blank username.
pub fn collect_pppoe_usernames(
    clients: &[SourceClient],
    attribute_id: u64,
) -> Vec<(String, String)> {
    clients
        .iter()
        .filter_map(|client| {
            attribute_value(&client.attributes, attribute_id)
                .map(|username| (client.id.to_string(), username.to_string()))
        })
        .collect()
}

fn targets_for<'a>(
    source_client_id: &str,
    client_map: &ClientIdMap,
    services: &'a ServiceIndex,
) -> Result<&'a [ServiceSummary], RecordError> {
    let destination_id = client_map
        .lookup(source_client_id)
        .ok_or_else(|| RecordError::DependencyMissing(Dependency::Client(source_client_id.into())))?;
    match services.services_for(destination_id) {
        [] => Err(RecordError::DependencyMissing(Dependency::Service(destination_id))),
        found => Ok(found),
    }
}

/// 🗺️ Resolve every username down to the services that still need it. Pure.
pub fn plan_work(
    usernames: &[(String, String)],
    client_map: &ClientIdMap,
    services: &ServiceIndex,
    attribute_id: u64,
) -> WorkPlan {
    let mut plan = WorkPlan::default();
    for (source_client_id, username) in usernames {
        plan.stats.available += 1;
        let targets = match targets_for(source_client_id, client_map, services) {
            Ok(targets) => targets,
            Err(RecordError::DependencyMissing(Dependency::Service(_))) => {
                plan.stats.matched_client += 1;
                plan.stats.skipped_no_service += 1;
                continue;
            }
            Err(missing) => {
                plan.stats.skipped_no_client += 1;
                debug!("⏭️ PPPoE {}: {}", username, missing);
                continue;
            }
        };
        plan.stats.matched_client += 1;
        if targets.len() > 1 {
            plan.stats.multi_service_clients += 1;
        }
        for service in targets {
            if service.attribute_value(attribute_id).is_some() {
                plan.stats.skipped_already_set += 1;
                continue;
            }
            plan.items.push(WorkItem {
                service_id: service.id,
                service_name: service.name.clone(),
                pppoe_username: username.clone(),
                source_client_id: source_client_id.clone(),
            });
        }
    }
    plan.stats.work = plan.items.len();
    plan
}

fn dry_run_preview(items: &[WorkItem]) -> Summary {
    let title = format!(
        "🔍 DRY RUN: {} services would be updated (showing {})",
        items.len(),
        items.len().min(DRY_RUN_PREVIEW)
    );
    Summary::new(title).rows(items.iter().take(DRY_RUN_PREVIEW).map(|item| {
        (
            format!("Service {} ({})", item.service_id, item.service_name),
            format!("{} (old client {})", item.pppoe_username, item.source_client_id),
        )
    }))
}

/// 🔧 PATCH every planned service, in order. Failures are counted, never propagated.
pub async fn apply(
    destination: &ApiClient,
    items: &[WorkItem],
    ctx: &PipelineContext,
) -> PppoeUpdate {
    let resume_from = ctx.options.resume_from;
    let attribute_id = ctx.app_config.mapping.destination_pppoe_attribute_id;
    let total = items.len();
    let mut stats = PatchStats::default();
    let mut failures = FailureLog::new("pppoe");
    let mut progress = ProgressMetrics::new(
        "pppoe",
        total.saturating_sub(resume_from) as u64,
        ctx.app_config.runtime.progress_every,
    );

    for (index, item) in items.iter().enumerate().skip(resume_from) {
        if ctx.stop_requested() {
            stats.interrupted = true;
            info!("🛑 Stopped before service index {}. Resume with --resume-from {}", index, index);
            break;
        }
        let body = pppoe_patch(attribute_id, &item.pppoe_username);
        let endpoint = format!("/clients/services/{}", item.service_id);
        match destination.patch(&endpoint, &body).await {
            Ok(_) => {
                stats.updated += 1;
                debug!(
                    "✅ [{}/{}] Service {} ← {}",
                    index + 1,
                    total,
                    item.service_id,
                    item.pppoe_username
                );
            }
            Err(ApiError::Cancelled) => {
                stats.interrupted = true;
                info!("🛑 Interrupted at service index {}. Resume with --resume-from {}", index, index);
                break;
            }
            Err(err) => {
                stats.failed += 1;
                error!("💀 [{}/{}] Service {}: {}", index + 1, total, item.service_id, err);
                failures.push(FailedPatch {
                    service_id: item.service_id,
                    pppoe: item.pppoe_username.clone(),
                    old_client_id: item.source_client_id.clone(),
                    error: manifest_error(&err),
                });
            }
        }
        ctx.pace().await;
        progress.record();
    }
    progress.finish();
    PppoeUpdate { stats, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DestinationClient, ServiceRecord};
    use crate::pipelines::RunOptions;
    use crate::pipelines::test_support::{context, crm, written};
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn client_map() -> ClientIdMap {
        let clients: Vec<DestinationClient> = serde_json::from_value(json!([
            {"id": 100, "userIdent": "1"},
            {"id": 200, "userIdent": "2"},
            {"id": 300, "userIdent": "3"}
        ]))
        .expect("💀 fixture clients");
        ClientIdMap::build(&clients)
    }

    fn service_index() -> ServiceIndex {
        let services: Vec<ServiceRecord> = serde_json::from_value(json!([
            {"id": 11, "clientId": 100, "name": "Fiber 50"},
            {"id": 21, "clientId": 200, "name": "Fiber 50",
             "attributes": [{"customAttributeId": 2, "value": "already"}]},
            {"id": 22, "clientId": 200, "name": "Fiber 100"}
        ]))
        .expect("💀 fixture services");
        ServiceIndex::build(&services)
    }

    fn usernames() -> Vec<(String, String)> {
        vec![
            ("1".into(), "ana".into()),
            ("2".into(), "ben".into()),
            ("3".into(), "cy".into()),
            ("9".into(), "ghost".into()),
        ]
    }

    #[test]
    fn the_one_where_usernames_are_trimmed_and_blanks_dropped() {
        let clients: Vec<SourceClient> = serde_json::from_value(json!([
            {"id": 1, "attributes": [{"customAttributeId": 1, "value": "  ana  "}]},
            {"id": 2, "attributes": [{"customAttributeId": 1, "value": "   "}]},
            {"id": 3, "attributes": [{"customAttributeId": 7, "value": "other"}]},
            {"id": 4, "attributes": null}
        ]))
        .expect("💀 fixture source clients");

        assert_eq!(
            collect_pppoe_usernames(&clients, 1),
            vec![("1".to_string(), "ana".to_string())]
        );
    }

    #[test]
    fn the_one_where_planning_skips_what_is_already_set() {
        let plan = plan_work(&usernames(), &client_map(), &service_index(), 2);

        let services: Vec<u64> = plan.items.iter().map(|item| item.service_id).collect();
        assert_eq!(services, vec![11, 22]);
        assert_eq!(
            plan.stats,
            PlanningStats {
                available: 4,
                matched_client: 3,
                skipped_no_client: 1,
                skipped_no_service: 1,
                skipped_already_set: 1,
                multi_service_clients: 1,
                work: 2,
            }
        );
        assert_eq!(plan.items[1].pppoe_username, "ben");
        assert_eq!(plan.items[1].source_client_id, "2");
    }

    #[tokio::test]
    async fn the_one_where_failed_patches_land_in_the_manifest() {
        let destination = crm().await;
        Mock::given(method("PATCH"))
            .and(path("/crm/api/v1.0/clients/services/11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 11})))
            .mount(&destination)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/crm/api/v1.0/clients/services/22"))
            .respond_with(ResponseTemplate::new(422).set_body_string("attribute locked"))
            .mount(&destination)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 destination");

        let plan = plan_work(&usernames(), &client_map(), &service_index(), 2);
        let update = apply(&client, &plan.items, &ctx).await;

        assert_eq!(update.stats.updated, 1);
        assert_eq!(update.stats.failed, 1);
        assert_eq!(update.failures.entries()[0].service_id, 22);
        assert_eq!(update.failures.entries()[0].old_client_id, "2");
        assert!(update.failures.entries()[0].error.contains("attribute locked"));
        assert_eq!(
            written(&destination, "PATCH", "/crm/api/v1.0/clients/services/11").await,
            vec![json!({"attributes": [{"customAttributeId": 2, "value": "ana"}]})]
        );
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_during_a_rate_limit_wait_leaves_the_rest_untouched() {
        let destination = crm().await;
        Mock::given(method("PATCH"))
            .and(path("/crm/api/v1.0/clients/services/11"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3600"))
            .mount(&destination)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 destination");
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let plan = plan_work(&usernames(), &client_map(), &service_index(), 2);
        let update = tokio::time::timeout(Duration::from_secs(5), apply(&client, &plan.items, &ctx))
            .await
            .expect("💀 the hour-long wait should have been cut short");

        assert!(update.stats.interrupted);
        assert_eq!(update.stats.updated, 0);
        assert_eq!(update.stats.failed, 0);
        assert!(written(&destination, "PATCH", "/crm/api/v1.0/clients/services/22").await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_the_whole_pass_runs_end_to_end() {
        let source = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "attributes": [{"customAttributeId": 1, "value": "ana"}]}
            ])))
            .mount(&source)
            .await;

        let destination = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 100, "userIdent": "1"}
            ])))
            .mount(&destination)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "clientId": 100, "name": "Fiber 50"},
                {"id": 12, "clientId": 100, "name": "Fiber 100"}
            ])))
            .mount(&destination)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&destination)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(
            Some(&source),
            Some(&destination),
            dir.path(),
            RunOptions {
                limit: Some(1),
                ..RunOptions::default()
            },
        );
        run(&ctx).await.expect("💀 pppoe pass should succeed");

        let patched: Vec<Value> = written(&destination, "PATCH", "/crm/api/v1.0/clients/services/11").await;
        assert_eq!(patched.len(), 1);
        assert!(
            written(&destination, "PATCH", "/crm/api/v1.0/clients/services/12")
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn the_one_where_dry_run_patches_nothing() {
        let source = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "attributes": [{"customAttributeId": 1, "value": "ana"}]}
            ])))
            .mount(&source)
            .await;
        let destination = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 100, "userIdent": "1"}
            ])))
            .mount(&destination)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 11, "clientId": 100, "name": "Fiber 50"}
            ])))
            .mount(&destination)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(
            Some(&source),
            Some(&destination),
            dir.path(),
            RunOptions {
                dry_run: true,
                ..RunOptions::default()
            },
        );
        run(&ctx).await.expect("💀 dry run should succeed");

        let requests = destination.received_requests().await.unwrap_or_default();
        assert!(requests.iter().all(|request| request.method.as_str() == "GET"));
    }

    #[test]
    fn the_one_where_the_preview_stops_at_twenty() {
        let items: Vec<WorkItem> = (0..25)
            .map(|n| WorkItem {
                service_id: n,
                service_name: "Fiber".into(),
                pppoe_username: format!("user{n}"),
                source_client_id: n.to_string(),
            })
            .collect();
        let preview = dry_run_preview(&items);
        assert!(preview.title().contains("25 services"));
        assert!(preview.title().contains("showing 20"));
        assert_eq!(preview.value("Service 19 (Fiber)"), Some("user19 (old client 19)"));
        assert_eq!(preview.value("Service 20 (Fiber)"), None);
    }
}
