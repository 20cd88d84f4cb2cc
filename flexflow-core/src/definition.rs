//! State machine definition types.
//!
//! Machine definitions are supplied as JSON documents:
//!
//! ```json
//! {
//!   "machineId": "order_v1",
//!   "initialState": "Draft",
//!   "states": ["Draft", "Submitted", "Approved", "Rejected"],
//!   "endStates": ["Approved", "Rejected"],
//!   "transitions": [
//!     {"source": "Draft", "target": "Submitted", "event": "submit"},
//!     {"source": "Submitted", "target": "Approved", "event": "approve",
//!      "guard": {"name": "headerValueGuard",
//!                "params": {"headerName": "role", "requiredValue": "manager"}}},
//!     {"source": "Submitted", "target": "Rejected", "event": "reject",
//!      "action": {"name": "logAction"}}
//!   ]
//! }
//! ```
//!
//! A [`Definition`] is the validated form. It carries no executable behavior;
//! plugin references stay unresolved until the machine is compiled.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Reference to a named guard or action plus the parameters handed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRef {
    /// Registry name of the plugin.
    pub name: String,

    /// Parameters passed verbatim to the plugin. Absent means empty.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl PluginRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A transition as written in the definition document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Source state.
    pub source: String,

    /// Target state.
    pub target: String,

    /// Event that triggers this transition.
    pub event: String,

    /// Optional guard gating the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<PluginRef>,

    /// Optional action run when the transition is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PluginRef>,
}

impl Transition {
    pub fn new(
        source: impl Into<String>,
        event: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            event: event.into(),
            guard: None,
            action: None,
        }
    }

    pub fn with_guard(mut self, guard: PluginRef) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: PluginRef) -> Self {
        self.action = Some(action);
        self
    }
}

/// Raw definition document as stored/transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionDocument {
    /// Globally unique machine identifier.
    pub machine_id: String,

    /// Initial state for new entities.
    pub initial_state: String,

    /// All valid states, in declaration order.
    pub states: Vec<String>,

    /// Terminal states.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub end_states: Vec<String>,

    /// Transitions, in evaluation order.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// Validated machine definition.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Original document, kept for re-serialization and storage.
    document: DefinitionDocument,

    states: HashSet<String>,

    end_states: HashSet<String>,

    /// CRC32C of the canonical serialized document.
    checksum: String,
}

impl Definition {
    /// Parses and validates a definition from a JSON value.
    pub fn parse(raw: &Value) -> Result<Self, CoreError> {
        let document: DefinitionDocument = serde_json::from_value(raw.clone())?;
        Self::from_document(document)
    }

    /// Parses and validates a definition from JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let document: DefinitionDocument = serde_json::from_str(raw)?;
        Self::from_document(document)
    }

    /// Validates an already-deserialized document.
    pub fn from_document(document: DefinitionDocument) -> Result<Self, CoreError> {
        if document.machine_id.trim().is_empty() {
            return Err(CoreError::invalid("machineId must not be empty"));
        }

        if document.states.is_empty() {
            return Err(CoreError::invalid(format!(
                "machine '{}' declares no states",
                document.machine_id
            )));
        }

        let mut states = HashSet::with_capacity(document.states.len());
        for state in &document.states {
            if !states.insert(state.clone()) {
                return Err(CoreError::invalid(format!(
                    "duplicate state '{}' in states list",
                    state
                )));
            }
        }

        if !states.contains(&document.initial_state) {
            return Err(CoreError::invalid(format!(
                "initial state '{}' not in states list",
                document.initial_state
            )));
        }

        let mut end_states = HashSet::with_capacity(document.end_states.len());
        for state in &document.end_states {
            if !states.contains(state) {
                return Err(CoreError::invalid(format!(
                    "end state '{}' not in states list",
                    state
                )));
            }
            end_states.insert(state.clone());
        }

        for (idx, t) in document.transitions.iter().enumerate() {
            if t.event.is_empty() {
                return Err(CoreError::invalid(format!(
                    "transition #{} has an empty event name",
                    idx
                )));
            }
            if !states.contains(&t.source) {
                return Err(CoreError::invalid(format!(
                    "transition source '{}' not in states list",
                    t.source
                )));
            }
            if !states.contains(&t.target) {
                return Err(CoreError::invalid(format!(
                    "transition target '{}' not in states list",
                    t.target
                )));
            }
            for plugin in t.guard.iter().chain(t.action.iter()) {
                if plugin.name.trim().is_empty() {
                    return Err(CoreError::invalid(format!(
                        "transition #{} references a plugin with an empty name",
                        idx
                    )));
                }
            }
        }

        let json_bytes = serde_json::to_vec(&document)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            document,
            states,
            end_states,
            checksum,
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.document.machine_id
    }

    pub fn initial_state(&self) -> &str {
        &self.document.initial_state
    }

    /// Returns true if the given state is declared by this machine.
    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    /// Returns true if the given state is terminal.
    pub fn is_end_state(&self, state: &str) -> bool {
        self.end_states.contains(state)
    }

    pub fn states(&self) -> &HashSet<String> {
        &self.states
    }

    pub fn end_states(&self) -> &HashSet<String> {
        &self.end_states
    }

    /// Transitions in document order.
    pub fn transitions(&self) -> &[Transition] {
        &self.document.transitions
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn document(&self) -> &DefinitionDocument {
        &self.document
    }

    /// Returns the definition as a JSON document.
    pub fn to_json(&self) -> Result<Value, CoreError> {
        Ok(serde_json::to_value(&self.document)?)
    }
}
