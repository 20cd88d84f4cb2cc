//! Persistence contracts consumed by the engine.
//!
//! The core never touches storage directly. Adapters implement these traits;
//! `flexflow-storage` ships in-memory and file-backed implementations.

use crate::definition::Definition;
use crate::entity::EntityState;
use crate::error::CoreError;
use serde_json::Value;

/// Looks up raw definition documents by machine id.
pub trait DefinitionSource: Send + Sync {
    /// Returns the raw document, or `None` if the id is unknown.
    fn find_definition(&self, machine_id: &str) -> Result<Option<Value>, CoreError>;
}

/// A definition source that also accepts new or updated definitions.
pub trait DefinitionStore: DefinitionSource {
    /// Stores a validated definition under its machine id.
    ///
    /// Returns `false` when an identical document (same checksum) is already
    /// stored, `true` when the stored document was created or replaced.
    fn put_definition(&self, definition: &Definition) -> Result<bool, CoreError>;

    /// Lists stored machine ids, sorted.
    fn list_definitions(&self) -> Result<Vec<String>, CoreError>;
}

/// Reads and conditionally writes entity state records.
pub trait EntityStore: Send + Sync {
    /// Inserts a new record. Fails with [`CoreError::EntityExists`] if the
    /// business id is taken.
    fn insert(&self, entity: EntityState) -> Result<(), CoreError>;

    /// Reads the current record.
    fn read(&self, business_id: &str) -> Result<Option<EntityState>, CoreError>;

    /// Compare-and-swap write of a new state.
    ///
    /// Must atomically check that the stored version equals
    /// `expected_version` and, if so, store `new_state` with version
    /// `expected_version + 1`. Fails with [`CoreError::VersionConflict`] on a
    /// mismatch and [`CoreError::EntityNotFound`] if the record is gone.
    fn write_state(
        &self,
        business_id: &str,
        new_state: &str,
        expected_version: u64,
    ) -> Result<EntityState, CoreError>;
}
