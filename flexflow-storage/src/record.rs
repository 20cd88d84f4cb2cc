//! Persisted record layouts.

use serde::{Deserialize, Serialize};

/// Stored machine definition: the raw document plus its checksum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDefinition {
    pub machine_id: String,
    pub checksum: String,
    pub definition: serde_json::Value,
}

impl StoredDefinition {
    pub fn from_definition(
        definition: &flexflow_core::Definition,
    ) -> Result<Self, flexflow_core::CoreError> {
        Ok(Self {
            machine_id: definition.machine_id().to_string(),
            checksum: definition.checksum().to_string(),
            definition: definition.to_json()?,
        })
    }
}
