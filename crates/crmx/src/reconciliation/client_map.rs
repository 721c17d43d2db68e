use std::collections::HashMap;

use tracing::warn;

use crate::common::DestinationClient;

/// 🗺️ Source client id → destination client id.
///
/// Clients without a `userIdent` were not created by the import (or predate it)
/// and are left out. If two destination clients claim the same `userIdent`, the
/// one scanned last wins and a warning is logged; the scan order is the API's
/// order, so rebuilding from the same snapshot gives the same map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdMap {
    by_source_id: HashMap<String, u64>,
}

impl ClientIdMap {
    pub fn build<'a>(clients: impl IntoIterator<Item = &'a DestinationClient>) -> Self {
        let mut by_source_id = HashMap::new();
        for client in clients {
            let Some(source_id) = client.user_ident.as_deref().map(str::trim) else {
                continue;
            };
            if source_id.is_empty() {
                continue;
            }
            if let Some(previous) = by_source_id.insert(source_id.to_string(), client.id) {
                if previous != client.id {
                    warn!(
                        "⚠️ userIdent '{}' is claimed by destination clients {} and {}; keeping {}",
                        source_id, previous, client.id, client.id
                    );
                }
            }
        }
        Self { by_source_id }
    }

    /// 🔎 Destination id for a source id, if that client was migrated.
    pub fn lookup(&self, source_id: &str) -> Option<u64> {
        self.by_source_id.get(source_id.trim()).copied()
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.lookup(source_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_source_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source_id.is_empty()
    }
}
