use std::collections::HashMap;

use crate::common::{CustomAttribute, ServiceRecord, attribute_value};

/// 🛠️ What a patch pass needs to know about one destination service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSummary {
    pub id: u64,
    pub name: String,
    pub status: Option<i64>,
    pub attributes: Vec<CustomAttribute>,
}

impl ServiceSummary {
    /// Current non-blank value of a custom attribute.
    pub fn attribute_value(&self, attribute_id: u64) -> Option<&str> {
        attribute_value(&self.attributes, attribute_id)
    }
}

impl From<&ServiceRecord> for ServiceSummary {
    fn from(record: &ServiceRecord) -> Self {
        Self {
            id: record.id,
            name: record.display_name(),
            status: record.status,
            attributes: record.attributes.clone(),
        }
    }
}

/// 📇 Destination client id → its services, in scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceIndex {
    by_client: HashMap<u64, Vec<ServiceSummary>>,
}

impl ServiceIndex {
    /// Services without an owning client are dropped.
    pub fn build<'a>(services: impl IntoIterator<Item = &'a ServiceRecord>) -> Self {
        let mut by_client: HashMap<u64, Vec<ServiceSummary>> = HashMap::new();
        for service in services {
            match service.client_id {
                Some(client_id) if client_id != 0 => {
                    by_client
                        .entry(client_id)
                        .or_default()
                        .push(ServiceSummary::from(service));
                }
                _ => {}
            }
        }
        Self { by_client }
    }

    /// Empty slice when the client has no services.
    pub fn services_for(&self, client_id: u64) -> &[ServiceSummary] {
        self.by_client
            .get(&client_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn client_count(&self) -> usize {
        self.by_client.len()
    }

    pub fn service_count(&self) -> usize {
        self.by_client.values().map(Vec::len).sum()
    }
}
