//! In-memory store.

use crate::record::StoredDefinition;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flexflow_core::{
    CoreError, Definition, DefinitionSource, DefinitionStore, EntityState, EntityStore,
};
use serde_json::Value;

/// Definitions and entities held in concurrent maps.
///
/// Compare-and-swap writes run under the map's per-entry guard, so racing
/// writers against one entity serialize while other entities proceed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    definitions: DashMap<String, StoredDefinition>,
    entities: DashMap<String, EntityState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

impl DefinitionSource for MemoryStore {
    fn find_definition(&self, machine_id: &str) -> Result<Option<Value>, CoreError> {
        Ok(self
            .definitions
            .get(machine_id)
            .map(|stored| stored.definition.clone()))
    }
}

impl DefinitionStore for MemoryStore {
    fn put_definition(&self, definition: &Definition) -> Result<bool, CoreError> {
        let stored = StoredDefinition::from_definition(definition)?;
        match self.definitions.entry(stored.machine_id.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().checksum == stored.checksum {
                    return Ok(false);
                }
                existing.insert(stored);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(true)
            }
        }
    }

    fn list_definitions(&self) -> Result<Vec<String>, CoreError> {
        let mut ids: Vec<String> = self.definitions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

impl EntityStore for MemoryStore {
    fn insert(&self, entity: EntityState) -> Result<(), CoreError> {
        match self.entities.entry(entity.business_id.clone()) {
            Entry::Occupied(_) => Err(CoreError::EntityExists {
                business_id: entity.business_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        }
    }

    fn read(&self, business_id: &str) -> Result<Option<EntityState>, CoreError> {
        Ok(self.entities.get(business_id).map(|e| e.value().clone()))
    }

    fn write_state(
        &self,
        business_id: &str,
        new_state: &str,
        expected_version: u64,
    ) -> Result<EntityState, CoreError> {
        let mut entity =
            self.entities
                .get_mut(business_id)
                .ok_or_else(|| CoreError::EntityNotFound {
                    business_id: business_id.to_string(),
                })?;

        if entity.version != expected_version {
            return Err(CoreError::VersionConflict {
                business_id: business_id.to_string(),
                expected: expected_version,
                actual: entity.version,
            });
        }

        entity.apply_transition(new_state);
        Ok(entity.clone())
    }
}
