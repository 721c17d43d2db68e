//! 📦 Common types: the shapes both CRMs speak, plus the rows the legacy CSV export spits out.
//!
//! 🧠 Knowledge graph:
//! - API records are decoded leniently. The CRM sends `userIdent` as a string on one
//!   instance and a number on the other, `attributes` as `null` or `[]` depending on
//!   mood, and `clientId` as whatever it felt like that day.
//! - Only the fields the pipelines read are modelled. Exports keep the raw JSON so
//!   snapshots lose nothing.
//! - `LegacyClient` / `LegacyService` are what the CSV reader produces.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 🧽 `null` → `T::default()`. serde's `#[serde(default)]` only covers a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 🧽 Strings, numbers, bools → `Some(String)`. `null` and `""` → `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

// ===== API records =====

/// 👤 A client as the destination lists it. `user_ident` is the join key back to the source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationClient {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_ident: Option<String>,
}

/// 👤 A client as the source lists it, for the PPPoE scan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceClient {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Vec<CustomAttribute>,
}

/// 🏷️ One custom attribute value on a client or a service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAttribute {
    #[serde(default)]
    pub custom_attribute_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

/// 🔎 First non-blank value for `attribute_id`, trimmed.
pub(crate) fn attribute_value(attributes: &[CustomAttribute], attribute_id: u64) -> Option<&str> {
    attributes
        .iter()
        .filter(|attr| attr.custom_attribute_id == Some(attribute_id))
        .filter_map(|attr| attr.value.as_deref())
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// 🛠️ A service as `/clients/services` lists it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: u64,
    #[serde(default)]
    pub client_id: Option<u64>,
    #[serde(default)]
    pub service_plan_id: Option<u64>,
    #[serde(default)]
    pub service_plan_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Vec<CustomAttribute>,
}

impl ServiceRecord {
    /// Plan name if the CRM filled it in, else the service name, else `?`.
    pub fn display_name(&self) -> String {
        [&self.service_plan_name, &self.name]
            .into_iter()
            .flatten()
            .find(|name| !name.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "?".to_string())
    }
}

/// 📋 A canonical plan on the destination.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServicePlan {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub periods: Vec<PlanPeriod>,
}

impl ServicePlan {
    /// The period id a new service must reference.
    pub fn first_enabled_period(&self) -> Option<u64> {
        self.periods
            .iter()
            .filter(|period| period.enabled)
            .find_map(|period| period.id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlanPeriod {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
}

/// 🧾 Invoice lifecycle as the CRM numbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "i64")]
pub enum InvoiceStatus {
    Draft,
    Unpaid,
    Partial,
    Paid,
    Void,
    #[default]
    Missing,
    Unknown(i64),
}

impl From<i64> for InvoiceStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => InvoiceStatus::Draft,
            1 => InvoiceStatus::Unpaid,
            2 => InvoiceStatus::Partial,
            3 => InvoiceStatus::Paid,
            4 => InvoiceStatus::Void,
            other => InvoiceStatus::Unknown(other),
        }
    }
}

impl InvoiceStatus {
    /// 💸 Paid and Partial invoices carry money that has to follow them across.
    pub fn carries_payment(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Partial)
    }

    /// The numeric code, `-1` when the CRM sent none.
    pub fn code(self) -> i64 {
        match self {
            InvoiceStatus::Draft => 0,
            InvoiceStatus::Unpaid => 1,
            InvoiceStatus::Partial => 2,
            InvoiceStatus::Paid => 3,
            InvoiceStatus::Void => 4,
            InvoiceStatus::Missing => -1,
            InvoiceStatus::Unknown(code) => code,
        }
    }

    pub fn label(self) -> String {
        match self {
            InvoiceStatus::Draft => "Draft".into(),
            InvoiceStatus::Unpaid => "Unpaid".into(),
            InvoiceStatus::Partial => "Partial".into(),
            InvoiceStatus::Paid => "Paid".into(),
            InvoiceStatus::Void => "Void".into(),
            InvoiceStatus::Missing => "Unknown(-1)".into(),
            InvoiceStatus::Unknown(code) => format!("Unknown({code})"),
        }
    }
}

/// 🧾 An invoice as exported from the source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInvoice {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub client_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: InvoiceStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amount_paid: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<InvoiceItem>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub maturity_days: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub currency_code: Option<String>,
}

impl SourceInvoice {
    /// The invoice number, or `?` for the rare invoice without one.
    pub fn number_or_placeholder(&self) -> &str {
        self.number.as_deref().unwrap_or("?")
    }
}

/// 📄 One invoice line. Price and quantity stay raw JSON so `1000` is not re-rendered as `1000.0`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvoiceItem {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// 🧾 The two fields of a destination invoice that the duplicate check needs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationInvoice {
    #[serde(default)]
    pub client_id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: Option<String>,
}

// ===== Legacy CSV rows =====

/// 🗺️ A lat/lon pair. Only kept when both halves parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub lat: f64,
    pub lon: f64,
}

/// 👤 One client from the legacy CSV, with the services listed under it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyClient {
    pub original_id: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub is_lead: bool,
    pub email: String,
    pub phone: String,
    pub street1: String,
    pub street2: String,
    pub city: String,
    pub zip_code: String,
    pub note: String,
    pub registration_date: Option<String>,
    pub gps: Option<GpsPoint>,
    /// 🏷️ The `PPPOE Username` custom attribute column.
    pub pppoe_username: Option<String>,
    pub services: Vec<LegacyService>,
}

impl LegacyClient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// 🛠️ One service row from the legacy CSV.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyService {
    /// Free-text plan name. This is what the plan matcher has to make sense of.
    pub name: String,
    pub invoice_label: String,
    pub note: String,
    pub active_from: Option<String>,
    pub active_to: Option<String>,
    pub invoicing_start: Option<String>,
    /// 💸 Overrides the plan's price for this one service.
    pub individual_price: Option<f64>,
    pub gps: Option<GpsPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_user_ident_arrives_as_whatever_it_wants() {
        let clients: Vec<DestinationClient> = serde_json::from_value(json!([
            {"id": 1, "userIdent": "42"},
            {"id": 2, "userIdent": 43},
            {"id": 3, "userIdent": null},
            {"id": 4, "userIdent": ""},
            {"id": 5}
        ]))
        .expect("💀 lenient decode should accept all of these");

        let idents: Vec<Option<&str>> = clients.iter().map(|c| c.user_ident.as_deref()).collect();
        assert_eq!(idents, vec![Some("42"), Some("43"), None, None, None]);
    }

    #[test]
    fn the_one_where_invoice_status_codes_become_words() {
        let invoice: SourceInvoice = serde_json::from_value(json!({
            "id": 500,
            "clientId": 42,
            "status": 3,
            "amountPaid": 1000,
            "items": null
        }))
        .expect("💀 invoice should decode");

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.status.carries_payment());
        assert_eq!(invoice.client_id.as_deref(), Some("42"));
        assert!(invoice.items.is_empty());
        assert_eq!(invoice.amount_paid, 1000.0);
        assert_eq!(InvoiceStatus::from(9).label(), "Unknown(9)");
        assert!(!InvoiceStatus::Unpaid.carries_payment());
    }

    #[test]
    fn the_one_where_the_first_enabled_period_wins() {
        let plan: ServicePlan = serde_json::from_value(json!({
            "id": 10,
            "name": "Fiber 50",
            "periods": [
                {"id": 100, "enabled": false},
                {"id": 101, "enabled": true},
                {"id": 102, "enabled": true}
            ]
        }))
        .expect("💀 plan should decode");
        assert_eq!(plan.first_enabled_period(), Some(101));
    }

    #[test]
    fn the_one_where_service_names_fall_back_gracefully() {
        let service: ServiceRecord =
            serde_json::from_value(json!({"id": 1, "servicePlanName": "", "name": "Legacy 10"}))
                .expect("💀 service should decode");
        assert_eq!(service.display_name(), "Legacy 10");

        let nameless: ServiceRecord =
            serde_json::from_value(json!({"id": 2, "attributes": null})).expect("💀 decode");
        assert_eq!(nameless.display_name(), "?");
        assert!(nameless.attributes.is_empty());
    }

    #[test]
    fn the_one_where_blank_attributes_do_not_count() {
        let attributes = vec![
            CustomAttribute {
                custom_attribute_id: Some(1),
                value: Some("   ".into()),
            },
            CustomAttribute {
                custom_attribute_id: Some(1),
                value: Some(" juan.pppoe ".into()),
            },
        ];
        assert_eq!(attribute_value(&attributes, 1), Some("juan.pppoe"));
        assert_eq!(attribute_value(&attributes, 2), None);
    }
}
