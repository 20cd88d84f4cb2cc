//! Core error types.

use crate::plugin::{PluginError, PluginKind};
use thiserror::Error;

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("definition not found: {machine_id}")]
    DefinitionNotFound { machine_id: String },

    #[error("{kind} not found: {name}")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("invalid plugin registration: {reason}")]
    InvalidPlugin { reason: String },

    #[error("entity not found: {business_id}")]
    EntityNotFound { business_id: String },

    #[error("entity already exists: {business_id}")]
    EntityExists { business_id: String },

    #[error("version conflict on '{business_id}': expected {expected}, actual {actual}")]
    VersionConflict {
        business_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("state '{state}' is not defined by machine '{machine_id}'")]
    UnknownState { machine_id: String, state: String },

    #[error("guard '{name}' failed: {source}")]
    GuardFailed {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("action '{name}' failed: {source}")]
    ActionFailed {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    ///
    /// Only optimistic-concurrency conflicts qualify; the caller decides
    /// whether to re-run the whole trigger.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::VersionConflict { .. })
    }

    /// Returns a stable error code suitable for transport responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDefinition { .. } => "INVALID_DEFINITION",
            CoreError::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            CoreError::PluginNotFound { .. } => "PLUGIN_NOT_FOUND",
            CoreError::InvalidPlugin { .. } => "INVALID_PLUGIN",
            CoreError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            CoreError::EntityExists { .. } => "ENTITY_EXISTS",
            CoreError::VersionConflict { .. } => "CONFLICT",
            CoreError::UnknownState { .. } => "UNKNOWN_STATE",
            CoreError::GuardFailed { .. } => "GUARD_FAILED",
            CoreError::ActionFailed { .. } => "ACTION_FAILED",
            CoreError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::InvalidDefinition {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::InvalidDefinition {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = CoreError::VersionConflict {
            business_id: "ord-1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_retryable());
        assert_eq!(conflict.error_code(), "CONFLICT");

        let missing = CoreError::EntityNotFound {
            business_id: "ord-1".to_string(),
        };
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_plugin_not_found_message() {
        let err = CoreError::PluginNotFound {
            kind: PluginKind::Guard,
            name: "approvalGuard".to_string(),
        };
        assert_eq!(err.to_string(), "guard not found: approvalGuard");
    }
}
