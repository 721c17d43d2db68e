//! 🔗 Reconciliation: who is who, across two CRMs that never met.
//!
//! 🧠 Knowledge graph:
//! - [`ClientIdMap`]: source client id → destination client id. Built from one scan of
//!   destination clients, keyed by the `userIdent` the client import stamped on them.
//! - [`ServiceIndex`]: destination client id → that client's services, with their
//!   current custom attributes so patch passes can tell "already set" from "empty".
//! - Both are plain values. Build once per run, pass by reference, never mutate.
//!   A miss is an ordinary `None` the caller counts and skips.

use tracing::info;

use crate::client::ApiClient;
use crate::common::{DestinationClient, ServiceRecord};
use crate::error::ApiError;
use crate::pagination::{PageRequest, fetch_all_as};

mod client_map;
mod service_index;

pub use client_map::ClientIdMap;
pub use service_index::{ServiceIndex, ServiceSummary};

/// 📡 Scan every destination client and index them by `userIdent`.
pub async fn discover_client_map(
    destination: &ApiClient,
    page_size: usize,
) -> Result<ClientIdMap, ApiError> {
    info!("🔗 Building client id map from {} clients", destination.label());
    let clients: Vec<DestinationClient> =
        fetch_all_as(destination, "/clients", PageRequest::all(page_size)).await?;
    let map = ClientIdMap::build(&clients);
    info!(
        "✅ Scanned {} clients, {} carry a userIdent",
        clients.len(),
        map.len()
    );
    Ok(map)
}

/// 📡 Scan every destination service and group them by owning client.
pub async fn discover_service_index(
    destination: &ApiClient,
    page_size: usize,
) -> Result<ServiceIndex, ApiError> {
    info!("🔗 Building service index from {} services", destination.label());
    let services: Vec<ServiceRecord> =
        fetch_all_as(destination, "/clients/services", PageRequest::all(page_size)).await?;
    let index = ServiceIndex::build(&services);
    info!(
        "✅ Indexed {} of {} services across {} clients",
        index.service_count(),
        services.len(),
        index.client_count()
    );
    Ok(index)
}
