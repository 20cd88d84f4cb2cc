//! Entity lifecycle service - coordinates the cache, engine, and stores.

use crate::compiler::{CompiledMachine, MachineCache};
use crate::definition::Definition;
use crate::engine::{Outcome, TransitionEngine};
use crate::entity::EntityState;
use crate::error::CoreError;
use crate::plugin::{Headers, PluginRegistry, ENTITY_ID_HEADER};
use crate::store::{DefinitionSource, DefinitionStore, EntityStore};
use serde_json::Value;
use std::sync::Arc;

/// Public service surface for creating and triggering entities.
pub struct EntityService {
    definitions: Arc<dyn DefinitionStore>,
    entities: Arc<dyn EntityStore>,
    cache: MachineCache,
}

impl EntityService {
    /// Creates a service over a single store that holds both definitions and
    /// entities.
    pub fn new<S>(store: Arc<S>, registry: Arc<PluginRegistry>) -> Self
    where
        S: DefinitionStore + EntityStore + 'static,
    {
        Self::with_stores(store.clone(), store, registry)
    }

    /// Creates a service over separate definition and entity stores.
    pub fn with_stores<D, E>(
        definitions: Arc<D>,
        entities: Arc<E>,
        registry: Arc<PluginRegistry>,
    ) -> Self
    where
        D: DefinitionStore + 'static,
        E: EntityStore + 'static,
    {
        let source: Arc<dyn DefinitionSource> = definitions.clone();
        Self {
            definitions,
            entities,
            cache: MachineCache::new(source, registry),
        }
    }

    /// Creates an entity at its machine's initial state (version 0).
    pub fn create_entity(
        &self,
        business_id: &str,
        machine_id: &str,
    ) -> Result<EntityState, CoreError> {
        if self.entities.read(business_id)?.is_some() {
            return Err(CoreError::EntityExists {
                business_id: business_id.to_string(),
            });
        }

        let machine = self.cache.get(machine_id)?;
        let entity = EntityState::new(business_id, machine_id, machine.initial_state());

        tracing::info!(
            "Creating entity '{}' with machine '{}', initial state '{}'",
            business_id,
            machine_id,
            entity.current_state
        );

        self.entities.insert(entity.clone())?;
        Ok(entity)
    }

    /// Triggers `event` on an entity.
    ///
    /// Returns `true` if the state changed and was committed, `false` if no
    /// transition applied. A [`CoreError::VersionConflict`] means another
    /// writer committed first; the action of this attempt has already run.
    pub fn trigger_event(
        &self,
        business_id: &str,
        event: &str,
        headers: &Headers,
    ) -> Result<bool, CoreError> {
        tracing::info!(
            "Attempting to trigger event '{}' for entity '{}'",
            event,
            business_id
        );

        let entity = self.restore(business_id)?;
        let machine = self.cache.get(&entity.machine_id)?;

        let mut headers = headers.clone();
        headers
            .entry(ENTITY_ID_HEADER)
            .or_insert_with(|| Value::String(business_id.to_string()));

        match TransitionEngine::attempt(&machine, &entity.current_state, event, &headers)? {
            Outcome::Changed(new_state) => {
                let updated = self
                    .entities
                    .write_state(business_id, &new_state, entity.version)?;
                tracing::info!(
                    "Event '{}' accepted for entity '{}': {} -> {} (version {})",
                    event,
                    business_id,
                    entity.current_state,
                    updated.current_state,
                    updated.version
                );
                Ok(true)
            }
            Outcome::Unchanged => {
                tracing::warn!(
                    "Event '{}' did not change state of entity '{}', current state '{}'",
                    event,
                    business_id,
                    entity.current_state
                );
                Ok(false)
            }
        }
    }

    /// Reads an entity without running any transition logic.
    pub fn get_entity(&self, business_id: &str) -> Result<Option<EntityState>, CoreError> {
        self.entities.read(business_id)
    }

    /// Events with at least one transition from the entity's current state.
    /// Guards are not evaluated.
    pub fn available_events(&self, business_id: &str) -> Result<Vec<String>, CoreError> {
        let entity = self.restore(business_id)?;
        let machine = self.cache.get(&entity.machine_id)?;
        Ok(machine
            .events_from(&entity.current_state)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Validates and stores a definition, evicting the cached machine if the
    /// stored document changed.
    ///
    /// The new definition is compiled up front, so unresolved plugins are
    /// rejected before anything is stored.
    pub fn put_definition(&self, raw: &Value) -> Result<bool, CoreError> {
        let definition = Definition::parse(raw)?;
        CompiledMachine::compile(&definition, self.cache.registry())?;

        let changed = self.definitions.put_definition(&definition)?;
        if changed {
            tracing::info!(
                "Stored definition '{}' (checksum {})",
                definition.machine_id(),
                definition.checksum()
            );
            self.cache.invalidate(definition.machine_id());
        }
        Ok(changed)
    }

    /// Evicts a machine from the compiled cache.
    pub fn clear_cache(&self, machine_id: &str) -> bool {
        self.cache.invalidate(machine_id)
    }

    /// Returns the compiled machine for an id, compiling on first use.
    pub fn machine(&self, machine_id: &str) -> Result<Arc<CompiledMachine>, CoreError> {
        self.cache.get(machine_id)
    }

    pub fn cache(&self) -> &MachineCache {
        &self.cache
    }

    fn restore(&self, business_id: &str) -> Result<EntityState, CoreError> {
        self.entities
            .read(business_id)?
            .ok_or_else(|| CoreError::EntityNotFound {
                business_id: business_id.to_string(),
            })
    }
}
