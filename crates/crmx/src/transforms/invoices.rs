//! 🧾 Source invoice → destination invoice body, and the payment that has to follow it.

use serde_json::{Map, Value, json};

use crate::app_config::MappingConfig;
use crate::common::{InvoiceItem, SourceInvoice};
use crate::error::RecordError;
use crate::transforms::json_number;

const DEFAULT_ITEM_LABEL: &str = "Imported item";

/// 📦 Body for `POST /clients/{id}/invoices`. An invoice with no lines is refused.
pub fn invoice_payload(
    invoice: &SourceInvoice,
    mapping: &MappingConfig,
) -> Result<Value, RecordError> {
    if invoice.items.is_empty() {
        return Err(RecordError::NoItems);
    }
    let items: Vec<Value> = invoice.items.iter().map(item_payload).collect();

    let mut payload = Map::new();
    payload.insert("number".into(), json!(invoice.number_or_placeholder()));
    payload.insert("items".into(), Value::Array(items));
    payload.insert("createdDate".into(), json!(invoice.created_date));
    payload.insert(
        "maturityDays".into(),
        json!(invoice.maturity_days.unwrap_or(mapping.default_maturity_days)),
    );
    payload.insert(
        "adminNotes".into(),
        json!(format!("Imported from old UISP (ID: {})", invoice.id)),
    );
    if let Some(notes) = invoice.notes.as_deref().filter(|notes| !notes.is_empty()) {
        payload.insert("notes".into(), json!(notes));
    }
    Ok(Value::Object(payload))
}

fn item_payload(item: &InvoiceItem) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "label".into(),
        json!(item.label.as_deref().unwrap_or(DEFAULT_ITEM_LABEL)),
    );
    payload.insert("price".into(), present_or(&item.price, json!(0)));
    payload.insert("quantity".into(), present_or(&item.quantity, json!(1)));
    if let Some(unit) = item.unit.as_deref().filter(|unit| !unit.is_empty()) {
        payload.insert("unit".into(), json!(unit));
    }
    Value::Object(payload)
}

fn present_or(value: &Option<Value>, fallback: Value) -> Value {
    match value {
        Some(Value::Null) | None => fallback,
        Some(present) => present.clone(),
    }
}

/// 💸 Body for `POST /payments`, or `None` when the invoice carries no money.
///
/// Only Paid and Partial invoices with a positive `amountPaid` produce one.
pub fn payment_payload(
    invoice: &SourceInvoice,
    destination_client_id: u64,
    destination_invoice_id: u64,
    mapping: &MappingConfig,
) -> Option<Value> {
    if !invoice.status.carries_payment() || invoice.amount_paid <= 0.0 {
        return None;
    }
    let currency = invoice
        .currency_code
        .as_deref()
        .filter(|code| !code.is_empty())
        .unwrap_or(mapping.currency_code.as_str());
    Some(json!({
        "clientId": destination_client_id,
        "amount": json_number(invoice.amount_paid),
        "currencyCode": currency,
        "methodId": mapping.payment_method_id,
        "createdDate": invoice.created_date,
        "note": format!("Imported - Invoice #{}", invoice.number_or_placeholder()),
        "invoiceIds": [destination_invoice_id],
    }))
}
