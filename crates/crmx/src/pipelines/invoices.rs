//! 🧾 Invoices: export from the source, then recreate each one under its reconciled
//! client on the destination, followed by the payment that makes its status true.
//!
//! ```text
//! source /invoices ──► invoices_export.json ──┐
//!              (or --import-from a snapshot) ─┴─► void? skip
//!                                                client map miss? skip
//!                                                number already there? skip
//!                                                POST /clients/{id}/invoices
//!                                                Paid/Partial + amountPaid > 0 → POST /payments
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::backends::snapshot::{read_snapshot, write_snapshot};
use crate::client::ApiClient;
use crate::common::{DestinationInvoice, InvoiceStatus, SourceInvoice};
use crate::error::{ApiError, Dependency, RecordError};
use crate::pagination::{PageRequest, fetch_all_as};
use crate::pipelines::{PipelineContext, export_collection};
use crate::progress::{ProgressMetrics, format_number};
use crate::reconciliation::{ClientIdMap, discover_client_map};
use crate::report::{FailureLog, Summary, manifest_error};
use crate::transforms::invoices::{invoice_payload, payment_payload};

pub const EXPORT_FILE: &str = "invoices_export.json";
const TEST_SIZE: usize = 10;

/// 📊 Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceStats {
    pub created: usize,
    pub failed: usize,
    pub skipped_no_client: usize,
    pub skipped_existing: usize,
    pub void_skipped: usize,
    pub payments_created: usize,
    pub payments_failed: usize,
    pub interrupted: bool,
}

impl InvoiceStats {
    pub fn summary(&self) -> Summary {
        Summary::new("🧾 INVOICE IMPORT SUMMARY")
            .row("Invoices created", self.created)
            .row("Invoices failed", self.failed)
            .row("Invoices skipped (no client)", self.skipped_no_client)
            .row("Invoices skipped (already imported)", self.skipped_existing)
            .row("Void invoices skipped", self.void_skipped)
            .row("Payments created", self.payments_created)
            .row("Payments failed", self.payments_failed)
    }
}

/// 📒 One manifest line. `stage` says whether the invoice or its payment failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedInvoice {
    pub old_id: u64,
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub stage: &'static str,
    pub error: String,
}

/// 🏁 What a finished (or interrupted) import leaves behind.
#[derive(Debug, Clone)]
pub struct InvoiceImport {
    pub stats: InvoiceStats,
    pub failures: FailureLog<FailedInvoice>,
}

enum Outcome {
    Void,
    AlreadyImported,
    Created { payment: Option<Result<(), ApiError>> },
}

/// 🚀 The whole `invoices` command.
pub async fn run(
    ctx: &PipelineContext,
    export_only: bool,
    import_from: Option<&Path>,
) -> Result<()> {
    let limit = ctx.limit(TEST_SIZE);
    let invoices = match import_from {
        Some(path) => load_invoices(path, limit).await?,
        None => {
            let source = ctx.connect_source().await?;
            let exported = export_invoices(&source, ctx).await?;
            if ctx.stop_requested() {
                info!("🛑 Stopped after the export. The partial snapshot can go through --import-from.");
                return Ok(());
            }
            if export_only {
                info!("✅ Export complete. Use --import-from to import later.");
                return Ok(());
            }
            exported
        }
    };

    if ctx.options.dry_run {
        dry_run_summary(&invoices).log();
        return Ok(());
    }

    let destination = ctx.connect_destination().await?;
    let page_size = ctx.app_config.runtime.discovery_page_size;
    let client_map = discover_client_map(&destination, page_size)
        .await
        .context("💀 Couldn't build the client id map from the destination")?;
    if client_map.is_empty() {
        bail!("💀 No destination client carries a userIdent. Run the client import first.");
    }
    let existing = discover_existing_invoices(&destination, page_size)
        .await
        .context("💀 Couldn't list the invoices already on the destination")?;

    info!("🚀 Starting import of {} invoices", invoices.len());
    let import = import_invoices(&destination, &invoices, &client_map, &existing, ctx).await;
    import.stats.summary().log();
    import
        .failures
        .persist(&ctx.app_config.runtime.artifacts_dir)
        .await?;
    Ok(())
}

/// 📤 Page `/invoices` out of the source and snapshot it to disk.
pub async fn export_invoices(
    source: &ApiClient,
    ctx: &PipelineContext,
) -> Result<Vec<SourceInvoice>> {
    info!("📤 Exporting invoices from {}", source.label());
    let request = PageRequest {
        page_size: ctx.app_config.runtime.export_page_size,
        limit: ctx.limit(TEST_SIZE),
        offset: ctx.options.offset,
    };
    let export = export_collection(source, "/invoices", request).await;

    let path = ctx.artifact(EXPORT_FILE);
    let bytes = write_snapshot(&path, &export.records).await?;
    info!(
        "💾 Exported {} invoices to {} ({:.1} MB)",
        format_number(export.records.len() as u64),
        path.display(),
        bytes as f64 / 1024.0 / 1024.0
    );

    let invoices: Vec<SourceInvoice> = serde_json::from_value(Value::Array(export.records))
        .context("💀 An exported invoice didn't have the shape we expected")?;
    status_distribution(&invoices).log();
    Ok(invoices)
}

/// 📥 Load a previous export, capped at `limit`.
pub async fn load_invoices(path: &Path, limit: Option<usize>) -> Result<Vec<SourceInvoice>> {
    info!("📥 Loading invoices from {}", path.display());
    let mut invoices: Vec<SourceInvoice> = read_snapshot(path).await?;
    info!("✅ Loaded {} invoices from file", invoices.len());
    if let Some(limit) = limit {
        invoices.truncate(limit);
    }
    Ok(invoices)
}

/// 🔑 `(destination client id, invoice number)` for every invoice already on the destination.
pub async fn discover_existing_invoices(
    destination: &ApiClient,
    page_size: usize,
) -> Result<HashSet<(u64, String)>, ApiError> {
    let invoices: Vec<DestinationInvoice> =
        fetch_all_as(destination, "/invoices", PageRequest::all(page_size)).await?;
    let existing: HashSet<(u64, String)> = invoices
        .into_iter()
        .filter_map(|invoice| Some((invoice.client_id?, invoice.number?)))
        .collect();
    info!("🔑 {} invoices already on the destination", existing.len());
    Ok(existing)
}

/// 📊 Count per status, in status-code order.
pub fn status_distribution(invoices: &[SourceInvoice]) -> Summary {
    let mut counts: BTreeMap<i64, (String, usize)> = BTreeMap::new();
    for invoice in invoices {
        counts
            .entry(invoice.status.code())
            .or_insert_with(|| (invoice.status.label(), 0))
            .1 += 1;
    }
    Summary::new("📊 Status distribution").rows(counts.into_values())
}

/// 🧪 What an import would do, without doing it.
pub fn dry_run_summary(invoices: &[SourceInvoice]) -> Summary {
    let count = |status: InvoiceStatus| {
        invoices
            .iter()
            .filter(|invoice| invoice.status == status)
            .count()
    };
    let total_amount: f64 = invoices.iter().map(|invoice| invoice.total).sum();
    Summary::new(format!("🧪 DRY RUN: would import {} invoices", invoices.len()))
        .row("Paid", count(InvoiceStatus::Paid))
        .row("Unpaid", count(InvoiceStatus::Unpaid))
        .row("Partial", count(InvoiceStatus::Partial))
        .row("Void (skip)", count(InvoiceStatus::Void))
        .row("Total amount", format_amount(total_amount))
}

fn format_amount(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}₱{}.{:02}", format_number(cents / 100), cents % 100)
}

/// 🔁 The per-record loop. Never fails as a whole; every failure lands in the manifest.
pub async fn import_invoices(
    destination: &ApiClient,
    invoices: &[SourceInvoice],
    client_map: &ClientIdMap,
    existing: &HashSet<(u64, String)>,
    ctx: &PipelineContext,
) -> InvoiceImport {
    let resume_from = ctx.options.resume_from;
    let total = invoices.len();
    let mut stats = InvoiceStats::default();
    let mut failures = FailureLog::new("invoices");
    let mut progress = ProgressMetrics::new(
        "invoices",
        total.saturating_sub(resume_from) as u64,
        ctx.app_config.runtime.progress_every,
    );

    for (index, invoice) in invoices.iter().enumerate().skip(resume_from) {
        if ctx.stop_requested() {
            stats.interrupted = true;
            info!("🛑 Stopped before invoice index {}. Resume with --resume-from {}", index, index);
            break;
        }
        let position = format!("[{}/{}]", index + 1, total);
        let number = invoice.number_or_placeholder().to_string();

        match import_one(destination, invoice, client_map, existing, ctx).await {
            Ok(Outcome::Void) => stats.void_skipped += 1,
            Ok(Outcome::AlreadyImported) => {
                stats.skipped_existing += 1;
                debug!("⏭️ {} Invoice {} already on the destination", position, number);
            }
            Ok(Outcome::Created { payment }) => {
                stats.created += 1;
                match payment {
                    Some(Ok(())) => stats.payments_created += 1,
                    Some(Err(err)) => {
                        stats.payments_failed += 1;
                        error!(
                            "💀 {} Payment failed for invoice {}: {}",
                            position, number, err
                        );
                        failures.push(FailedInvoice {
                            old_id: invoice.id,
                            number,
                            client: invoice.client_id.clone(),
                            stage: "payment",
                            error: manifest_error(&err),
                        });
                    }
                    None => {}
                }
                ctx.pace().await;
            }
            Err(RecordError::DependencyMissing(missing)) => {
                stats.skipped_no_client += 1;
                debug!("⏭️ {} Skipped invoice {}: {}", position, number, missing);
            }
            Err(err) if err.is_cancelled() => {
                stats.interrupted = true;
                info!("🛑 Interrupted at invoice index {}. Resume with --resume-from {}", index, index);
                break;
            }
            Err(err) => {
                stats.failed += 1;
                error!("💀 {} Failed invoice {}: {}", position, number, err);
                failures.push(FailedInvoice {
                    old_id: invoice.id,
                    number,
                    client: invoice.client_id.clone(),
                    stage: "invoice",
                    error: manifest_error(&err),
                });
                if matches!(err, RecordError::Api(_)) {
                    ctx.pace().await;
                }
            }
        }
        progress.record();
    }
    progress.finish();

    InvoiceImport { stats, failures }
}

async fn import_one(
    destination: &ApiClient,
    invoice: &SourceInvoice,
    client_map: &ClientIdMap,
    existing: &HashSet<(u64, String)>,
    ctx: &PipelineContext,
) -> Result<Outcome, RecordError> {
    if invoice.status == InvoiceStatus::Void {
        return Ok(Outcome::Void);
    }
    let source_client = invoice.client_id.as_deref().unwrap_or_default();
    let client_id = client_map.lookup(source_client).ok_or_else(|| {
        RecordError::DependencyMissing(Dependency::Client(source_client.to_string()))
    })?;
    if let Some(number) = &invoice.number {
        if existing.contains(&(client_id, number.clone())) {
            return Ok(Outcome::AlreadyImported);
        }
    }

    let mapping = &ctx.app_config.mapping;
    let payload = invoice_payload(invoice, mapping)?;
    let created = destination
        .post(&format!("/clients/{client_id}/invoices"), &payload)
        .await?;
    let invoice_id = created
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(RecordError::MissingId("invoice"))?;
    debug!(
        "✅ Invoice {} → new ID {}",
        invoice.number_or_placeholder(),
        invoice_id
    );

    let payment = match payment_payload(invoice, client_id, invoice_id, mapping) {
        Some(body) => Some(destination.post("/payments", &body).await.map(|_| ())),
        None => None,
    };
    Ok(Outcome::Created { payment })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DestinationClient;
    use crate::pipelines::RunOptions;
    use crate::pipelines::test_support::{EndlessPages, context, crm, written};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoice(value: Value) -> SourceInvoice {
        serde_json::from_value(value).expect("💀 fixture invoice")
    }

    fn the_invoice_from_the_brochure() -> SourceInvoice {
        invoice(json!({
            "id": 500,
            "clientId": "42",
            "status": 3,
            "amountPaid": 1000,
            "number": "INV-500",
            "createdDate": "2024-02-01T00:00:00+0800",
            "items": [{"label": "Plan A", "price": 1000, "quantity": 1}]
        }))
    }

    fn client_map() -> ClientIdMap {
        let clients: Vec<DestinationClient> = serde_json::from_value(json!([
            {"id": 900, "userIdent": "42"},
            {"id": 901, "userIdent": "43"}
        ]))
        .expect("💀 fixture clients");
        ClientIdMap::build(&clients)
    }

    async fn destination_accepting_everything() -> MockServer {
        let destination = crm().await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/clients/900/invoices"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7001})))
            .mount(&destination)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/clients/901/invoices"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7002})))
            .mount(&destination)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/payments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .mount(&destination)
            .await;
        destination
    }

    #[tokio::test]
    async fn the_one_where_a_paid_invoice_crosses_over_with_its_payment() {
        let destination = destination_accepting_everything().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 connect");

        let import = import_invoices(
            &client,
            &[the_invoice_from_the_brochure()],
            &client_map(),
            &HashSet::new(),
            &ctx,
        )
        .await;

        assert_eq!(import.stats.created, 1);
        assert_eq!(import.stats.payments_created, 1);
        assert!(import.failures.is_empty());

        let invoices = written(&destination, "POST", "/crm/api/v1.0/clients/900/invoices").await;
        assert_eq!(invoices.len(), 1);
        assert_eq!(
            invoices[0]["items"],
            json!([{"label": "Plan A", "price": 1000, "quantity": 1}])
        );
        let payments = written(&destination, "POST", "/crm/api/v1.0/payments").await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0]["amount"], json!(1000));
        assert_eq!(payments[0]["clientId"], json!(900));
        assert_eq!(payments[0]["invoiceIds"], json!([7001]));
    }

    #[tokio::test]
    async fn the_one_where_void_unpaid_and_strangers_get_no_payment() {
        let destination = destination_accepting_everything().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 connect");

        let batch = vec![
            invoice(json!({"id": 1, "clientId": "42", "status": 4, "amountPaid": 50, "number": "V-1",
                           "items": [{"label": "x", "price": 50}]})),
            invoice(json!({"id": 2, "clientId": "42", "status": 1, "amountPaid": 0, "number": "U-2",
                           "items": [{"label": "x", "price": 50}]})),
            invoice(json!({"id": 3, "clientId": 43, "status": 0, "amountPaid": 10, "number": "D-3",
                           "items": [{"label": "x", "price": 10}]})),
            invoice(json!({"id": 4, "clientId": "42", "status": 3, "amountPaid": 0, "number": "P-4",
                           "items": [{"label": "x", "price": 0}]})),
            invoice(json!({"id": 5, "clientId": "77", "status": 3, "amountPaid": 5, "number": "S-5",
                           "items": [{"label": "x", "price": 5}]})),
        ];

        let import = import_invoices(&client, &batch, &client_map(), &HashSet::new(), &ctx).await;

        assert_eq!(import.stats.void_skipped, 1);
        assert_eq!(import.stats.created, 3);
        assert_eq!(import.stats.skipped_no_client, 1);
        assert_eq!(import.stats.payments_created, 0);
        let created_numbers: Vec<Value> = [
            written(&destination, "POST", "/crm/api/v1.0/clients/900/invoices").await,
            written(&destination, "POST", "/crm/api/v1.0/clients/901/invoices").await,
        ]
        .concat()
        .into_iter()
        .map(|body| body["number"].clone())
        .collect();
        assert!(!created_numbers.contains(&json!("V-1")));
        assert!(written(&destination, "POST", "/crm/api/v1.0/payments").await.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_failures_are_written_down_and_the_batch_carries_on() {
        let destination = crm().await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/clients/900/invoices"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("{\"message\":\"Validation failed.\"}"),
            )
            .mount(&destination)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/clients/901/invoices"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 8})))
            .mount(&destination)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 connect");

        let batch = vec![
            the_invoice_from_the_brochure(),
            invoice(json!({"id": 6, "clientId": "43", "status": 1, "number": "N-6", "items": []})),
            invoice(json!({"id": 7, "clientId": "43", "status": 1, "number": "N-7",
                           "items": [{"label": "ok", "price": 1}]})),
        ];
        let import = import_invoices(&client, &batch, &client_map(), &HashSet::new(), &ctx).await;

        assert_eq!(import.stats.failed, 2);
        assert_eq!(import.stats.created, 1);
        let errors: Vec<&str> = import
            .failures
            .entries()
            .iter()
            .map(|failure| failure.error.as_str())
            .collect();
        assert!(errors[0].starts_with("HTTP 422"));
        assert_eq!(errors[1], "No items");
        assert_eq!(import.failures.entries()[0].client.as_deref(), Some("42"));

        let manifest = import
            .failures
            .persist(dir.path())
            .await
            .expect("💀 persist")
            .expect("💀 two failures, one manifest");
        assert!(manifest.exists());
    }

    #[tokio::test]
    async fn the_one_where_resume_and_existing_numbers_skip_work() {
        let destination = destination_accepting_everything().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(
            None,
            Some(&destination),
            dir.path(),
            RunOptions {
                resume_from: 1,
                ..RunOptions::default()
            },
        );
        let client = ctx.connect_destination().await.expect("💀 connect");

        let batch = vec![
            invoice(json!({"id": 1, "clientId": "42", "status": 1, "number": "A-1",
                           "items": [{"label": "x"}]})),
            invoice(json!({"id": 2, "clientId": "42", "status": 1, "number": "A-2",
                           "items": [{"label": "x"}]})),
            invoice(json!({"id": 3, "clientId": "42", "status": 1, "number": "A-3",
                           "items": [{"label": "x"}]})),
        ];
        let existing = HashSet::from([(900, "A-2".to_string())]);
        let import = import_invoices(&client, &batch, &client_map(), &existing, &ctx).await;

        assert_eq!(import.stats.skipped_existing, 1);
        assert_eq!(import.stats.created, 1);
        let bodies = written(&destination, "POST", "/crm/api/v1.0/clients/900/invoices").await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["number"], json!("A-3"));
    }

    #[tokio::test]
    async fn the_one_where_an_interrupt_stops_before_the_next_invoice() {
        let destination = destination_accepting_everything().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 connect");
        ctx.cancel.cancel();

        let import = import_invoices(
            &client,
            &[the_invoice_from_the_brochure()],
            &client_map(),
            &HashSet::new(),
            &ctx,
        )
        .await;

        assert!(import.stats.interrupted);
        assert_eq!(import.stats.created, 0);
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_during_a_rate_limit_wait_is_not_a_failed_invoice() {
        let destination = crm().await;
        Mock::given(method("POST"))
            .and(path("/crm/api/v1.0/clients/900/invoices"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3600"))
            .mount(&destination)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let client = ctx.connect_destination().await.expect("💀 connect");
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let batch = [the_invoice_from_the_brochure()];
        let import = tokio::time::timeout(
            Duration::from_secs(5),
            import_invoices(&client, &batch, &client_map(), &HashSet::new(), &ctx),
        )
        .await
        .expect("💀 the hour-long wait should have been cut short");

        assert!(import.stats.interrupted);
        assert_eq!(import.stats.failed, 0);
        assert!(import.failures.entries().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_an_interrupted_export_is_kept_but_never_imported() {
        let source = crm().await;
        let destination = MockServer::start().await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let mut ctx = context(
            Some(&source),
            Some(&destination),
            dir.path(),
            RunOptions {
                limit: Some(10),
                ..RunOptions::default()
            },
        );
        ctx.app_config.runtime.export_page_size = 1;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/invoices"))
            .respond_with(EndlessPages {
                cancel_at: 2,
                cancel: ctx.cancel.clone(),
            })
            .mount(&source)
            .await;

        run(&ctx, false, None).await.expect("💀 an interrupt is not an error");

        let kept = load_invoices(&dir.path().join(EXPORT_FILE), None)
            .await
            .expect("💀 partial snapshot");
        assert!((2..10).contains(&kept.len()), "kept {} invoices", kept.len());
        let received = destination.received_requests().await.unwrap_or_default();
        assert!(received.is_empty(), "💀 import ran after the interrupt: {received:?}");
    }

    #[tokio::test]
    async fn the_one_where_the_whole_command_exports_then_imports() {
        let source = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/invoices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": 500, "clientId": "42", "status": 3, "amountPaid": 1000, "number": "INV-500",
                "items": [{"label": "Plan A", "price": 1000, "quantity": 1}]
            }])))
            .mount(&source)
            .await;
        let destination = destination_accepting_everything().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 900, "userIdent": "42"}])),
            )
            .mount(&destination)
            .await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/invoices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&destination)
            .await;

        let dir = tempfile::tempdir().expect("💀 tempdir");
        let ctx = context(Some(&source), Some(&destination), dir.path(), RunOptions::default());
        run(&ctx, false, None).await.expect("💀 the run should succeed");

        assert!(dir.path().join(EXPORT_FILE).exists());
        assert_eq!(written(&destination, "POST", "/crm/api/v1.0/payments").await.len(), 1);

        // -- the snapshot replays without the source
        let replayed = load_invoices(&dir.path().join(EXPORT_FILE), None)
            .await
            .expect("💀 snapshot reload");
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].number.as_deref(), Some("INV-500"));
    }

    #[tokio::test]
    async fn the_one_where_an_empty_client_map_refuses_to_start() {
        let destination = crm().await;
        Mock::given(method("GET"))
            .and(path("/crm/api/v1.0/clients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&destination)
            .await;
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let snapshot = dir.path().join("invoices.json");
        std::fs::write(&snapshot, "[]").expect("💀 write snapshot");

        let ctx = context(None, Some(&destination), dir.path(), RunOptions::default());
        let err = run(&ctx, false, Some(&snapshot))
            .await
            .expect_err("💀 nothing to map against");
        assert!(err.to_string().contains("Run the client import first"));
    }

    #[test]
    fn the_one_where_the_dry_run_adds_up_the_money() {
        let batch = vec![
            invoice(json!({"id": 1, "status": 3, "total": 1499.5})),
            invoice(json!({"id": 2, "status": 4, "total": 1000})),
            invoice(json!({"id": 3, "status": 1, "total": 0.5})),
        ];
        let summary = dry_run_summary(&batch);
        assert_eq!(summary.value("Paid"), Some("1"));
        assert_eq!(summary.value("Void (skip)"), Some("1"));
        assert_eq!(summary.value("Partial"), Some("0"));
        assert_eq!(summary.value("Total amount"), Some("₱2,500.00"));

        let distribution = status_distribution(&batch);
        assert_eq!(distribution.value("Unpaid"), Some("1"));
        assert_eq!(distribution.value("Void"), Some("1"));
    }
}
