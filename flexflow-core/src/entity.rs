//! Entity state records.

use serde::{Deserialize, Serialize};

/// Persisted lifecycle state of one business entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Caller-supplied business key.
    pub business_id: String,

    /// Machine governing this entity. Fixed at creation.
    pub machine_id: String,

    /// Current state in the machine.
    pub current_state: String,

    /// Optimistic-concurrency version. Starts at 0, +1 per committed transition.
    pub version: u64,

    /// Creation timestamp (Unix millis).
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    pub updated_at: i64,
}

impl EntityState {
    /// Creates a record at version 0.
    pub fn new(
        business_id: impl Into<String>,
        machine_id: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> Self {
        let now = now_millis();
        Self {
            business_id: business_id.into(),
            machine_id: machine_id.into(),
            current_state: initial_state.into(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a committed transition: sets the state and bumps the version.
    ///
    /// Storage adapters call this after their version check succeeds.
    pub fn apply_transition(&mut self, new_state: impl Into<String>) {
        self.current_state = new_state.into();
        self.version += 1;
        self.updated_at = now_millis();
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
