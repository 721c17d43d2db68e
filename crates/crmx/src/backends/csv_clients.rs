//! 🧾 The legacy CSV export: one client row, then that client's service rows, repeat.
//!
//! ```text
//! Id,First name,...,Service,...
//! 1042,Ana,...,Fiber 50,...      <- client row, may carry one service inline
//! ,,...,Fiber 100,...            <- service row for client 1042
//! 1043,Ben,...,,...              <- next client
//! ```
//!
//! Service rows that show up before any client row have no owner and are dropped.
//! Columns are looked up by header name, so column order and extra columns don't matter.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::common::{GpsPoint, LegacyClient, LegacyService};
use crate::transforms::{normalize_date, parse_price};

/// 📥 Read and group the CSV at `path`.
pub async fn read_legacy_clients(path: &Path, utc_offset: &str) -> Result<Vec<LegacyClient>> {
    info!("🧾 Parsing CSV: {}", path.display());
    let bytes = tokio::fs::read(path).await.with_context(|| {
        format!(
            "💀 Couldn't read the client CSV at '{}'. Check the path, or use an absolute one.",
            path.display()
        )
    })?;
    let clients = parse_legacy_clients(bytes.as_slice(), utc_offset)
        .with_context(|| format!("💀 The client CSV at '{}' didn't parse.", path.display()))?;
    info!("✅ Parsed {} clients from CSV", clients.len());
    Ok(clients)
}

/// 🧩 Parse from any reader. Split out so tests don't need files.
pub fn parse_legacy_clients<R: Read>(reader: R, utc_offset: &str) -> Result<Vec<LegacyClient>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let columns: HashMap<String, usize> = csv_reader
        .headers()
        .context("💀 The CSV has no header row")?
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), index))
        .collect();

    let mut clients = Vec::new();
    let mut current: Option<LegacyClient> = None;
    let mut orphan_rows = 0usize;

    for (row_number, record) in csv_reader.records().enumerate() {
        // -- +2: one for the header, one because humans count from 1
        let record = record.with_context(|| format!("💀 CSV row {} is malformed", row_number + 2))?;
        let row = Row {
            columns: &columns,
            record: &record,
        };

        if !row.get("Id").is_empty() {
            if let Some(finished) = current.take() {
                clients.push(finished);
            }
            let mut client = parse_client(&row, utc_offset);
            if let Some(service) = parse_service(&row, utc_offset) {
                client.services.push(service);
            }
            current = Some(client);
        } else if let Some(client) = current.as_mut() {
            if let Some(service) = parse_service(&row, utc_offset) {
                client.services.push(service);
            }
        } else {
            orphan_rows += 1;
        }
    }
    if let Some(finished) = current {
        clients.push(finished);
    }
    if orphan_rows > 0 {
        debug!("🗑️ Dropped {} service rows that came before any client", orphan_rows);
    }
    Ok(clients)
}

struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl Row<'_> {
    /// Trimmed cell, or `""` if the column is missing or the row is short.
    fn get(&self, column: &str) -> &str {
        self.columns
            .get(column)
            .and_then(|&index| self.record.get(index))
            .map(str::trim)
            .unwrap_or("")
    }

    fn optional(&self, column: &str) -> Option<String> {
        Some(self.get(column))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn gps(&self, lat_column: &str, lon_column: &str) -> Option<GpsPoint> {
        let lat = self.get(lat_column).parse::<f64>().ok()?;
        let lon = self.get(lon_column).parse::<f64>().ok()?;
        Some(GpsPoint { lat, lon })
    }
}

fn parse_client(row: &Row<'_>, utc_offset: &str) -> LegacyClient {
    LegacyClient {
        original_id: row.get("Id").to_string(),
        first_name: row.get("First name").to_string(),
        last_name: row.get("Last name").to_string(),
        company_name: row.get("Company name").to_string(),
        is_lead: row.get("Is Lead") == "1",
        email: first_of(row.get("Emails"), ','),
        phone: first_of(row.get("Phones"), '/'),
        street1: row.get("Street 1").to_string(),
        street2: row.get("Street 2").to_string(),
        city: row.get("City").to_string(),
        zip_code: row.get("ZIP code").to_string(),
        note: row.get("Note").to_string(),
        registration_date: normalize_date(row.get("Registration date"), utc_offset),
        gps: row.gps("Client latitude", "Client longitude"),
        pppoe_username: row.optional("PPPOE Username (custom attribute)"),
        services: Vec::new(),
    }
}

fn parse_service(row: &Row<'_>, utc_offset: &str) -> Option<LegacyService> {
    let name = row.optional("Service")?;
    let invoice_label = row
        .optional("Service invoice label")
        .unwrap_or_else(|| name.clone());

    Some(LegacyService {
        name,
        invoice_label,
        note: row.get("Service note").to_string(),
        active_from: normalize_date(row.get("Service active from (Y-m-d)"), utc_offset),
        active_to: normalize_date(row.get("Service active to (Y-m-d)"), utc_offset),
        invoicing_start: normalize_date(row.get("Service invoicing from (Y-m-d)"), utc_offset),
        individual_price: parse_price(row.get("Service individual price")),
        gps: row.gps("Service latitude", "Service longitude"),
    })
}

fn first_of(list: &str, separator: char) -> String {
    list.split(separator)
        .next()
        .map(str::trim)
        .unwrap_or("")
        .to_string()
}
