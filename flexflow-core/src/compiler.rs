//! Machine compilation and the compiled-machine cache.
//!
//! A [`CompiledMachine`] is the executable form of a [`Definition`]: every
//! plugin reference is resolved against the [`PluginRegistry`] and the
//! transitions are indexed by source state and event. Compiled machines are
//! immutable and shared through `Arc`.
//!
//! [`MachineCache`] compiles each machine id at most once. Every key owns a
//! slot; concurrent first requests for the same key serialize on that slot
//! while other keys proceed untouched.

use crate::definition::Definition;
use crate::error::CoreError;
use crate::plugin::{Action, Guard, Params, PluginKind, PluginRegistry};
use crate::store::DefinitionSource;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A plugin resolved against the registry, with its params.
pub struct Bound<P: ?Sized> {
    name: String,
    plugin: Arc<P>,
    params: Params,
}

impl<P: ?Sized> Bound<P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn params(&self) -> &Params {
        &self.params
    }
}

impl<P: ?Sized> fmt::Debug for Bound<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A transition whose guard and action are ready to invoke.
#[derive(Debug)]
pub struct BoundTransition {
    target: String,
    guard: Option<Bound<dyn Guard>>,
    action: Option<Bound<dyn Action>>,
}

impl BoundTransition {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn guard(&self) -> Option<&Bound<dyn Guard>> {
        self.guard.as_ref()
    }

    pub fn action(&self) -> Option<&Bound<dyn Action>> {
        self.action.as_ref()
    }
}

/// Executable, immutable form of a definition.
#[derive(Debug)]
pub struct CompiledMachine {
    machine_id: String,
    initial_state: String,
    states: HashSet<String>,
    end_states: HashSet<String>,
    /// source -> event -> candidates in document order.
    index: HashMap<String, HashMap<String, Vec<BoundTransition>>>,
    checksum: String,
}

impl CompiledMachine {
    /// Compiles a definition, resolving every plugin reference eagerly.
    pub fn compile(definition: &Definition, registry: &PluginRegistry) -> Result<Self, CoreError> {
        let mut index: HashMap<String, HashMap<String, Vec<BoundTransition>>> = HashMap::new();

        for t in definition.transitions() {
            let guard = match &t.guard {
                Some(r) => {
                    let plugin = registry.guard(&r.name).ok_or_else(|| CoreError::PluginNotFound {
                        kind: PluginKind::Guard,
                        name: r.name.clone(),
                    })?;
                    Some(Bound {
                        name: r.name.clone(),
                        plugin,
                        params: Params::new(r.params.clone()),
                    })
                }
                None => None,
            };

            let action = match &t.action {
                Some(r) => {
                    let plugin =
                        registry
                            .action(&r.name)
                            .ok_or_else(|| CoreError::PluginNotFound {
                                kind: PluginKind::Action,
                                name: r.name.clone(),
                            })?;
                    Some(Bound {
                        name: r.name.clone(),
                        plugin,
                        params: Params::new(r.params.clone()),
                    })
                }
                None => None,
            };

            index
                .entry(t.source.clone())
                .or_default()
                .entry(t.event.clone())
                .or_default()
                .push(BoundTransition {
                    target: t.target.clone(),
                    guard,
                    action,
                });
        }

        Ok(Self {
            machine_id: definition.machine_id().to_string(),
            initial_state: definition.initial_state().to_string(),
            states: definition.states().clone(),
            end_states: definition.end_states().clone(),
            index,
            checksum: definition.checksum().to_string(),
        })
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains(state)
    }

    pub fn is_end_state(&self, state: &str) -> bool {
        self.end_states.contains(state)
    }

    /// Candidate transitions for `(state, event)` in document order.
    pub fn candidates(&self, state: &str, event: &str) -> &[BoundTransition] {
        self.index
            .get(state)
            .and_then(|events| events.get(event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Events with at least one candidate from `state`, sorted. Empty for
    /// terminal states.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        if self.is_end_state(state) {
            return Vec::new();
        }
        let mut events: Vec<&str> = self
            .index
            .get(state)
            .map(|events| events.keys().map(String::as_str).collect())
            .unwrap_or_default();
        events.sort_unstable();
        events
    }
}

type Slot = Arc<RwLock<Option<Arc<CompiledMachine>>>>;

/// Cache of compiled machines keyed by machine id.
pub struct MachineCache {
    source: Arc<dyn DefinitionSource>,
    registry: Arc<PluginRegistry>,
    slots: DashMap<String, Slot>,
    compilations: AtomicU64,
}

impl MachineCache {
    pub fn new(source: Arc<dyn DefinitionSource>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            source,
            registry,
            slots: DashMap::new(),
            compilations: AtomicU64::new(0),
        }
    }

    /// Returns the compiled machine, compiling it on first access.
    ///
    /// Failures are not cached; the next call retries.
    pub fn get(&self, machine_id: &str) -> Result<Arc<CompiledMachine>, CoreError> {
        loop {
            let slot = self.slot(machine_id);

            if let Some(machine) = slot.read().as_ref() {
                return Ok(machine.clone());
            }

            let mut guard = slot.write();
            // Another caller may have finished while we waited.
            if let Some(machine) = guard.as_ref() {
                return Ok(machine.clone());
            }
            // A failed compile detaches its slot; retry on the live one.
            if !self.is_current(machine_id, &slot) {
                continue;
            }

            tracing::info!("Cache miss for machine '{}', compiling", machine_id);

            return match self.build(machine_id) {
                Ok(machine) => {
                    let machine = Arc::new(machine);
                    *guard = Some(machine.clone());
                    Ok(machine)
                }
                Err(e) => {
                    tracing::warn!("Failed to compile machine '{}': {}", machine_id, e);
                    self.slots
                        .remove_if(machine_id, |_, current| Arc::ptr_eq(current, &slot));
                    Err(e)
                }
            };
        }
    }

    /// Returns the cached machine without compiling.
    pub fn peek(&self, machine_id: &str) -> Option<Arc<CompiledMachine>> {
        let slot = self.slots.get(machine_id)?.value().clone();
        let machine = slot.read().clone();
        machine
    }

    /// Evicts a machine so the next access recompiles it. Holders of an
    /// already-obtained machine keep using it.
    pub fn invalidate(&self, machine_id: &str) -> bool {
        let removed = self.slots.remove(machine_id).is_some();
        if removed {
            tracing::info!("Cleared cache for machine '{}'", machine_id);
        }
        removed
    }

    /// Number of successful compilations since creation.
    pub fn compilations(&self) -> u64 {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of keys currently held, including in-flight compilations.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    fn slot(&self, machine_id: &str) -> Slot {
        if let Some(slot) = self.slots.get(machine_id) {
            return slot.value().clone();
        }
        self.slots
            .entry(machine_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn is_current(&self, machine_id: &str, slot: &Slot) -> bool {
        self.slots
            .get(machine_id)
            .map(|current| Arc::ptr_eq(current.value(), slot))
            .unwrap_or(false)
    }

    fn build(&self, machine_id: &str) -> Result<CompiledMachine, CoreError> {
        let raw = self
            .source
            .find_definition(machine_id)?
            .ok_or_else(|| CoreError::DefinitionNotFound {
                machine_id: machine_id.to_string(),
            })?;

        let definition = Definition::parse(&raw)?;
        if definition.machine_id() != machine_id {
            return Err(CoreError::invalid(format!(
                "stored definition for '{}' declares machineId '{}'",
                machine_id,
                definition.machine_id()
            )));
        }

        let machine = CompiledMachine::compile(&definition, &self.registry)?;
        self.compilations.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "Compiled machine '{}' (checksum {})",
            machine_id,
            machine.checksum()
        );

        Ok(machine)
    }
}
