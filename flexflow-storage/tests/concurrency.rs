//! Concurrent access through the entity service.

use flexflow_core::{
    CoreError, DefinitionStore, EntityService, EntityStore, Headers, PluginRegistry,
};
use flexflow_storage::{FileStore, MemoryStore};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

const THREADS: usize = 8;

fn flip_service<S>(store: Arc<S>) -> Arc<EntityService>
where
    S: DefinitionStore + EntityStore + 'static,
{
    let service = EntityService::new(store, Arc::new(PluginRegistry::with_builtins().unwrap()));
    service
        .put_definition(&json!({
            "machineId": "flip",
            "initialState": "off",
            "states": ["off", "on"],
            "transitions": [
                {"source": "off", "target": "on", "event": "toggle"},
                {"source": "on", "target": "off", "event": "toggle"}
            ]
        }))
        .unwrap();
    Arc::new(service)
}

/// Every trigger either commits or loses the version race; the final
/// version equals the number of commits.
fn racing_triggers(service: Arc<EntityService>) {
    service.create_entity("switch", "flip").unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut committed = 0u64;
                let mut conflicts = 0u64;
                for _ in 0..25 {
                    match service.trigger_event("switch", "toggle", &Headers::new()) {
                        Ok(true) => committed += 1,
                        Ok(false) => panic!("toggle is always enabled"),
                        Err(e) => {
                            assert!(e.is_retryable(), "unexpected error: {}", e);
                            assert!(matches!(e, CoreError::VersionConflict { .. }));
                            conflicts += 1;
                        }
                    }
                }
                (committed, conflicts)
            })
        })
        .collect();

    let (committed, conflicts) = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .fold((0, 0), |(c, x), (dc, dx)| (c + dc, x + dx));

    assert_eq!(committed + conflicts, (THREADS * 25) as u64);
    assert!(committed > 0);

    let entity = service.get_entity("switch").unwrap().unwrap();
    assert_eq!(entity.version, committed);
    let expected = if committed % 2 == 0 { "off" } else { "on" };
    assert_eq!(entity.current_state, expected);
}

#[test]
fn test_racing_triggers_memory() {
    racing_triggers(flip_service(Arc::new(MemoryStore::new())));
}

#[test]
fn test_racing_triggers_file() {
    let dir = TempDir::new().unwrap();
    racing_triggers(flip_service(Arc::new(FileStore::open(dir.path()).unwrap())));
}

#[test]
fn test_racing_creates_single_winner() {
    let store = Arc::new(MemoryStore::new());
    let service = flip_service(store.clone());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.create_entity("dup", "flip")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, CoreError::EntityExists { .. })));
    assert_eq!(store.entity_count(), 1);
}

#[test]
fn test_first_use_compiles_once() {
    let service = flip_service(Arc::new(MemoryStore::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let service = service.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                service.create_entity(&format!("e-{}", i), "flip").unwrap();
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(service.cache().compilations(), 1);
}
