//! 🛠️ Services export: plans and client services out of the source, onto disk.
//!
//! Read-only against the source. Produces `service_plans_export.json` (pretty, it's
//! small and people read it) and `services_export.json` (compact, it isn't), then a
//! report: status distribution, busiest plans, and how many services carry custom
//! attributes (the PPPoE usernames live there on some instances).

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

use crate::backends::snapshot::{write_pretty, write_snapshot};
use crate::client::ApiClient;
use crate::common::ServiceRecord;
use crate::pagination::PageRequest;
use crate::pipelines::{Export, PipelineContext, export_collection};
use crate::progress::format_number;
use crate::report::Summary;

pub const PLANS_FILE: &str = "service_plans_export.json";
pub const SERVICES_FILE: &str = "services_export.json";
const TEST_SIZE: usize = 10;
const TOP_PLANS: usize = 10;

/// 🏷️ The CRM's service status codes.
pub fn status_name(code: i64) -> String {
    match code {
        0 => "Prepared".into(),
        1 => "Active".into(),
        2 => "Suspended".into(),
        3 => "Prepared blocked".into(),
        4 => "Ended".into(),
        5 => "Quoted".into(),
        6 => "Obsolete".into(),
        7 => "Deferred".into(),
        8 => "Suspended (going to end)".into(),
        other => format!("Unknown({other})"),
    }
}

/// 🚀 The whole `export-services` command.
pub async fn run(ctx: &PipelineContext, skip_plans: bool) -> Result<Export> {
    let source = ctx.connect_source().await?;
    if !skip_plans {
        export_plans(&source, ctx).await?;
    }

    info!("📤 Exporting client services from {}", source.label());
    let request = PageRequest {
        page_size: ctx.app_config.runtime.export_page_size,
        limit: ctx.limit(TEST_SIZE),
        offset: ctx.options.offset,
    };
    let export = export_collection(&source, "/clients/services", request).await;
    let path = ctx.artifact(SERVICES_FILE);
    let bytes = write_snapshot(&path, &export.records).await?;
    info!(
        "💾 Exported {} services to {} ({:.1} MB)",
        format_number(export.records.len() as u64),
        path.display(),
        bytes as f64 / 1024.0 / 1024.0
    );

    let services: Vec<ServiceRecord> = serde_json::from_value(Value::Array(export.records.clone()))
        .context("💀 An exported service didn't have the shape we expected")?;
    service_report(&services).log();
    Ok(export)
}

/// 📋 `/service-plans` is one call, no paging.
pub async fn export_plans(source: &ApiClient, ctx: &PipelineContext) -> Result<Vec<Value>> {
    info!("📋 Exporting service plans from {}", source.label());
    let plans: Vec<Value> = source
        .get_as("/service-plans")
        .await
        .context("💀 Couldn't fetch service plans from the source")?;
    let path = ctx.artifact(PLANS_FILE);
    write_pretty(&path, &plans).await?;
    info!("💾 Saved {} service plans to {}", plans.len(), path.display());
    for plan in &plans {
        info!(
            "  Plan {}: {} (period: {} months)",
            display_field(plan, "id"),
            display_field(plan, "name"),
            display_field(plan, "invoicingPeriodMonths")
        );
    }
    Ok(plans)
}

fn display_field(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "?".to_string(),
        Some(other) => other.to_string(),
    }
}

/// 📊 Status distribution, top plans by service count, services with attributes.
pub fn service_report(services: &[ServiceRecord]) -> Summary {
    let mut by_status: BTreeMap<i64, usize> = BTreeMap::new();
    for service in services {
        *by_status.entry(service.status.unwrap_or(-1)).or_default() += 1;
    }

    // -- plan id → (first seen name, count, first seen position) so ties keep scan order
    let mut by_plan: HashMap<Option<u64>, (String, usize, usize)> = HashMap::new();
    for (position, service) in services.iter().enumerate() {
        by_plan
            .entry(service.service_plan_id)
            .or_insert_with(|| (service.display_name(), 0, position))
            .1 += 1;
    }
    let plan_count = by_plan.len();
    let mut top_plans: Vec<(Option<u64>, (String, usize, usize))> = by_plan.into_iter().collect();
    top_plans.sort_by(|a, b| b.1.1.cmp(&a.1.1).then_with(|| a.1.2.cmp(&b.1.2)));
    top_plans.truncate(TOP_PLANS);

    let with_attributes = services
        .iter()
        .filter(|service| !service.attributes.is_empty())
        .count();

    Summary::new(format!("📊 {} services", format_number(services.len() as u64)))
        .rows(
            by_status
                .into_iter()
                .map(|(code, count)| (status_name(code), count)),
        )
        .row(format!("Top plans ({} of {})", top_plans.len(), plan_count), "")
        .rows(top_plans.into_iter().map(|(plan_id, (name, count, _))| {
            let plan_id = plan_id.map_or_else(|| "?".to_string(), |id| id.to_string());
            (format!("  Plan {plan_id} ({name})"), count)
        }))
        .row(
            "Services with custom attributes",
            format!("{}/{}", with_attributes, services.len()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::RunOptions;
    use crate::pipelines::test_support::{EndlessPages, context, crm};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn services(value: Value) -> Vec<ServiceRecord> {
        serde_json::from_value(value).expect("💀 fixture services")
    }

    #[test]
    fn the_one_where_the_report_counts_statuses_and_ranks_plans() {
        let report = service_report(&services(json!([
            {"id": 1, "clientId": 10, "status": 1, "servicePlanId": 5, "servicePlanName": "Fiber 50",
             "attributes": [{"customAttributeId": 1, "value": "ana"}]},
            {"id": 2, "clientId": 11, "status": 1, "servicePlanId": 5, "servicePlanName": "Fiber 50"},
            {"id": 3, "clientId": 12, "status": 4, "servicePlanId": 6, "name": "Copper"},
            {"id": 4, "clientId": 13, "status": 9, "servicePlanId": 6, "name": "Copper", "attributes": null}
        ])));

        assert_eq!(report.value("Active"), Some("2"));
        assert_eq!(report.value("Ended"), Some("1"));
        assert_eq!(report.value("Unknown(9)"), Some("1"));
        assert_eq!(report.value("  Plan 5 (Fiber 50)"), Some("2"));
        assert_eq!(report.value("  Plan 6 (Copper)"), Some("2"));
        assert_eq!(report.value("Top plans (2 of 2)"), Some(""));
        assert_eq!(report.value("Services with custom attributes"), Some("1/4"));
    }

    #[tokio::test]
    async fn the_one_where_plans_and_services_end_up_on_disk() {
        let source = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/service-plans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 5, "name": "Fiber 50", "invoicingPeriodMonths": 1}
            ])))
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients/services"))
            .and(query_param("offset", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 4, "clientId": 10, "status": 1},
                {"id": 5, "clientId": 11, "status": 1}
            ])))
            .mount(&source)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(
            Some(&source),
            None,
            dir.path(),
            RunOptions {
                offset: 3,
                ..RunOptions::default()
            },
        );
        let export = run(&ctx, false).await.expect("💀 export should succeed");

        assert_eq!(export.records.len(), 2);
        assert_eq!(export.resume_offset, None);
        let on_disk: Vec<Value> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(SERVICES_FILE)).expect("💀 services file"),
        )
        .expect("💀 services json");
        assert_eq!(on_disk, export.records);
        assert!(dir.path().join(PLANS_FILE).exists());
    }

    #[tokio::test]
    async fn the_one_where_skip_plans_really_skips_them() {
        let source = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&source)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(Some(&source), None, dir.path(), RunOptions::default());

        let export = run(&ctx, true).await.expect("💀 export should succeed");
        assert!(export.records.is_empty());
        assert!(!dir.path().join(PLANS_FILE).exists());
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_mid_export_keeps_what_was_fetched() {
        let source = crm().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let mut ctx = context(
            Some(&source),
            None,
            dir.path(),
            RunOptions {
                limit: Some(20),
                ..RunOptions::default()
            },
        );
        ctx.app_config.runtime.export_page_size = 2;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients/services"))
            .respond_with(EndlessPages {
                cancel_at: 4,
                cancel: ctx.cancel.clone(),
            })
            .mount(&source)
            .await;

        let export = run(&ctx, true).await.expect("💀 an interrupt is not an error");

        let kept = export.records.len();
        assert!((4..20).contains(&kept), "kept {kept} services");
        assert_eq!(export.resume_offset, Some(kept));
        let on_disk: Vec<Value> =
            crate::backends::snapshot::read_snapshot(&dir.path().join(SERVICES_FILE))
                .await
                .expect("💀 partial snapshot");
        assert_eq!(on_disk.len(), kept);
    }

    #[test]
    fn the_one_where_every_status_has_a_name() {
        assert_eq!(status_name(3), "Prepared blocked");
        assert_eq!(status_name(8), "Suspended (going to end)");
        assert_eq!(status_name(-1), "Unknown(-1)");
    }
}
