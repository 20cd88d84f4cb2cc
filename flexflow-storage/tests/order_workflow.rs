//! End-to-end order workflow against both store implementations.

use flexflow_core::{
    CoreError, DefinitionStore, EntityService, EntityStore, FnAction, Headers, PluginRegistry,
};
use flexflow_storage::{FileStore, MemoryStore};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn order_definition() -> Value {
    json!({
        "machineId": "order_v1",
        "initialState": "Draft",
        "states": ["Draft", "Submitted", "Approved", "Rejected"],
        "endStates": ["Approved", "Rejected"],
        "transitions": [
            {"source": "Draft", "target": "Submitted", "event": "submit"},
            {
                "source": "Submitted",
                "target": "Approved",
                "event": "approve",
                "guard": {
                    "name": "headerValueGuard",
                    "params": {"headerName": "role", "requiredValue": "manager"}
                },
                "action": {"name": "logAction", "params": {"message": "approved"}}
            },
            {"source": "Submitted", "target": "Rejected", "event": "reject"}
        ]
    })
}

fn headers(pairs: &[(&str, Value)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn run_order_scenario<S>(store: Arc<S>)
where
    S: DefinitionStore + EntityStore + 'static,
{
    let registry = Arc::new(PluginRegistry::with_builtins().unwrap());
    let service = EntityService::new(store, registry);
    assert!(service.put_definition(&order_definition()).unwrap());

    let entity = service.create_entity("ord-1", "order_v1").unwrap();
    assert_eq!(entity.current_state, "Draft");
    assert_eq!(entity.version, 0);

    assert!(service.trigger_event("ord-1", "submit", &Headers::new()).unwrap());
    let entity = service.get_entity("ord-1").unwrap().unwrap();
    assert_eq!(entity.current_state, "Submitted");
    assert_eq!(entity.version, 1);

    // Guard rejects without the role header
    assert!(!service.trigger_event("ord-1", "approve", &Headers::new()).unwrap());
    let entity = service.get_entity("ord-1").unwrap().unwrap();
    assert_eq!(entity.current_state, "Submitted");
    assert_eq!(entity.version, 1);

    // Wrong role is also rejected
    let clerk = headers(&[("role", json!("clerk"))]);
    assert!(!service.trigger_event("ord-1", "approve", &clerk).unwrap());

    let manager = headers(&[("role", json!("manager"))]);
    assert!(service.trigger_event("ord-1", "approve", &manager).unwrap());
    let entity = service.get_entity("ord-1").unwrap().unwrap();
    assert_eq!(entity.current_state, "Approved");
    assert_eq!(entity.version, 2);

    // Terminal state
    assert!(!service.trigger_event("ord-1", "reject", &Headers::new()).unwrap());
    assert!(service.available_events("ord-1").unwrap().is_empty());
    assert_eq!(service.get_entity("ord-1").unwrap().unwrap().version, 2);

    assert_eq!(service.cache().compilations(), 1);
}

#[test]
fn test_order_scenario_memory() {
    run_order_scenario(Arc::new(MemoryStore::new()));
}

#[test]
fn test_order_scenario_file() {
    let dir = TempDir::new().unwrap();
    run_order_scenario(Arc::new(FileStore::open(dir.path()).unwrap()));
}

#[test]
fn test_file_store_resumes_workflow() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(PluginRegistry::with_builtins().unwrap());

    {
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let service = EntityService::new(store, registry.clone());
        service.put_definition(&order_definition()).unwrap();
        service.create_entity("ord-7", "order_v1").unwrap();
        assert!(service.trigger_event("ord-7", "submit", &Headers::new()).unwrap());
    }

    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let service = EntityService::new(store, registry);

    let entity = service.get_entity("ord-7").unwrap().unwrap();
    assert_eq!(entity.current_state, "Submitted");
    assert_eq!(service.available_events("ord-7").unwrap(), vec!["approve", "reject"]);

    assert!(service.trigger_event("ord-7", "reject", &Headers::new()).unwrap());
    assert_eq!(service.get_entity("ord-7").unwrap().unwrap().version, 2);
}

#[test]
fn test_action_sees_entity_id_header() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let registry = PluginRegistry::builder()
        .builtins()
        .action(FnAction::new("record", move |ctx, _params| {
            recorder
                .lock()
                .push(ctx.entity_id().unwrap_or_default().to_string());
            Ok(())
        }))
        .build()
        .unwrap();

    let service = EntityService::new(Arc::new(MemoryStore::new()), Arc::new(registry));
    service
        .put_definition(&json!({
            "machineId": "ping",
            "initialState": "a",
            "states": ["a", "b"],
            "transitions": [
                {"source": "a", "target": "b", "event": "go", "action": {"name": "record"}}
            ]
        }))
        .unwrap();
    service.create_entity("p-1", "ping").unwrap();

    assert!(service.trigger_event("p-1", "go", &Headers::new()).unwrap());
    assert_eq!(*seen.lock(), vec!["p-1"]);
}

#[test]
fn test_create_requires_definition() {
    let service = EntityService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(PluginRegistry::with_builtins().unwrap()),
    );

    let result = service.create_entity("ord-1", "missing");
    assert!(matches!(result, Err(CoreError::DefinitionNotFound { .. })));
    assert!(service.get_entity("ord-1").unwrap().is_none());

    let result = service.trigger_event("ghost", "submit", &Headers::new());
    assert!(matches!(result, Err(CoreError::EntityNotFound { .. })));
}

#[test]
fn test_unresolved_plugin_rejected_before_store() {
    let store = Arc::new(MemoryStore::new());
    let service = EntityService::new(
        store.clone(),
        Arc::new(PluginRegistry::with_builtins().unwrap()),
    );

    let mut doc = order_definition();
    doc["transitions"][0]["guard"] = json!({"name": "noSuchGuard"});

    let result = service.put_definition(&doc);
    assert!(matches!(result, Err(CoreError::PluginNotFound { .. })));
    assert!(store.list_definitions().unwrap().is_empty());
}

#[test]
fn test_redefinition_recompiles() {
    let service = EntityService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(PluginRegistry::with_builtins().unwrap()),
    );
    service.put_definition(&order_definition()).unwrap();
    service.create_entity("ord-1", "order_v1").unwrap();
    service.trigger_event("ord-1", "submit", &Headers::new()).unwrap();
    assert_eq!(service.cache().compilations(), 1);

    // Same document again: no eviction
    assert!(!service.put_definition(&order_definition()).unwrap());
    assert!(service.cache().peek("order_v1").is_some());

    // Drop the guard on approve
    let mut doc = order_definition();
    doc["transitions"][1]
        .as_object_mut()
        .unwrap()
        .remove("guard");
    assert!(service.put_definition(&doc).unwrap());
    assert!(service.cache().peek("order_v1").is_none());

    assert!(service.trigger_event("ord-1", "approve", &Headers::new()).unwrap());
    assert_eq!(service.cache().compilations(), 2);
}

#[test]
fn test_action_runs_once_per_accepted_event() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let registry = PluginRegistry::builder()
        .builtins()
        .action(FnAction::new("count", move |_ctx, _params| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .build()
        .unwrap();

    let service = EntityService::new(Arc::new(MemoryStore::new()), Arc::new(registry));
    service
        .put_definition(&json!({
            "machineId": "gate",
            "initialState": "closed",
            "states": ["closed", "open"],
            "transitions": [
                {
                    "source": "closed",
                    "target": "open",
                    "event": "open",
                    "guard": {
                        "name": "headerValueGuard",
                        "params": {"headerName": "key", "requiredValue": 42}
                    },
                    "action": {"name": "count"}
                },
                {"source": "open", "target": "closed", "event": "close"}
            ]
        }))
        .unwrap();
    service.create_entity("g-1", "gate").unwrap();

    assert!(!service.trigger_event("g-1", "open", &headers(&[("key", json!("42"))])).unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    assert!(service.trigger_event("g-1", "open", &headers(&[("key", json!(42))])).unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert!(!service.trigger_event("g-1", "missing", &Headers::new()).unwrap());
    assert_eq!(service.get_entity("g-1").unwrap().unwrap().version, 1);
}
