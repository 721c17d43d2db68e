//! 🔑 PPPoE username → `PATCH /clients/services/{id}` body.

use serde_json::{Value, json};

pub fn pppoe_patch(attribute_id: u64, username: &str) -> Value {
    json!({
        "attributes": [
            {"customAttributeId": attribute_id, "value": username}
        ]
    })
}
