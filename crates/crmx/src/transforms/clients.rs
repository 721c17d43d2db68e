//! 👤 Legacy CSV client → destination `POST /clients` body, and its services → `POST /clients/{id}/services`.

use serde_json::{Map, Value, json};

use crate::app_config::MappingConfig;
use crate::common::{GpsPoint, LegacyClient, LegacyService};
use crate::transforms::json_number;

/// 📦 Client payload. `userIdent` carries the legacy id; everything downstream joins on it.
///
/// The PPPoE username has no client-level home on the destination, so it rides in
/// the note as `PPPoE: <name>` until the PPPoE pass puts it on the service.
pub fn client_payload(client: &LegacyClient, mapping: &MappingConfig) -> Value {
    let mut payload = Map::new();
    payload.insert("firstName".into(), json!(client.first_name));
    payload.insert("lastName".into(), json!(client.last_name));
    payload.insert("isLead".into(), json!(client.is_lead));
    payload.insert("street1".into(), json!(client.street1));
    payload.insert("city".into(), json!(client.city));
    payload.insert("countryId".into(), json!(mapping.country_id));
    payload.insert("zipCode".into(), json!(client.zip_code));
    payload.insert("userIdent".into(), json!(client.original_id));

    insert_non_empty(&mut payload, "street2", &client.street2);
    insert_non_empty(&mut payload, "companyName", &client.company_name);
    if let Some(registered) = &client.registration_date {
        payload.insert("registrationDate".into(), json!(registered));
    }

    let note = match client.pppoe_username.as_deref() {
        Some(pppoe) if client.note.is_empty() => format!("PPPoE: {pppoe}"),
        Some(pppoe) => format!("{}\nPPPoE: {pppoe}", client.note),
        None => client.note.clone(),
    };
    insert_non_empty(&mut payload, "note", &note);
    insert_gps(&mut payload, client.gps);

    if !client.email.is_empty() {
        payload.insert(
            "contacts".into(),
            json!([{
                "email": client.email,
                "phone": client.phone,
                "name": client.full_name(),
                "isContact": true,
            }]),
        );
    }

    Value::Object(payload)
}

/// 📦 Service payload. The destination wants a plan *period* id, not a plan id.
/// `individualPrice` only goes out when the CSV overrode the plan's price.
pub fn service_payload(service: &LegacyService, plan_period_id: u64) -> Value {
    let mut payload = Map::new();
    payload.insert("servicePlanPeriodId".into(), json!(plan_period_id));
    for (key, date) in [
        ("activeFrom", &service.active_from),
        ("activeTo", &service.active_to),
        ("invoicingStart", &service.invoicing_start),
    ] {
        if let Some(date) = date {
            payload.insert(key.into(), json!(date));
        }
    }
    insert_non_empty(&mut payload, "invoiceLabel", &service.invoice_label);
    if let Some(price) = service.individual_price {
        payload.insert("individualPrice".into(), json_number(price));
    }
    insert_non_empty(&mut payload, "note", &service.note);
    insert_gps(&mut payload, service.gps);
    Value::Object(payload)
}

fn insert_non_empty(payload: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        payload.insert(key.into(), json!(value));
    }
}

fn insert_gps(payload: &mut Map<String, Value>, gps: Option<GpsPoint>) {
    if let Some(point) = gps {
        payload.insert("addressGpsLat".into(), json!(point.lat));
        payload.insert("addressGpsLon".into(), json!(point.lon));
    }
}
