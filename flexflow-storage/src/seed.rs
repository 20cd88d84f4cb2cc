//! Loads definition documents from a directory into a store.

use crate::error::StorageError;
use flexflow_core::{Definition, DefinitionStore};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a seeding pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    /// Machine ids stored by this pass.
    pub loaded: Vec<String>,
    /// Machine ids that were already present and left untouched.
    pub skipped: Vec<String>,
}

/// Seeds every `*.json` file in `dir`, in file name order.
///
/// Definitions whose machine id is already stored are skipped, so seeding
/// never overwrites a definition that was updated after startup. The first
/// invalid file aborts the pass.
pub fn seed_definitions<S>(store: &S, dir: &Path) -> Result<SeedReport, StorageError>
where
    S: DefinitionStore + ?Sized,
{
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut report = SeedReport::default();

    for path in paths {
        let content = fs::read_to_string(&path)?;
        let definition =
            Definition::from_json_str(&content).map_err(|source| StorageError::Seed {
                path: path.clone(),
                source,
            })?;
        let machine_id = definition.machine_id().to_string();

        if store.find_definition(&machine_id)?.is_some() {
            tracing::debug!(
                "Definition {} already present, skipping {}",
                machine_id,
                path.display()
            );
            report.skipped.push(machine_id);
            continue;
        }

        store.put_definition(&definition)?;
        tracing::info!("Seeded definition {} from {}", machine_id, path.display());
        report.loaded.push(machine_id);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use flexflow_core::DefinitionSource;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, doc: serde_json::Value) {
        fs::write(dir.join(name), doc.to_string()).unwrap();
    }

    fn doc(machine_id: &str, initial: &str) -> serde_json::Value {
        json!({
            "machineId": machine_id,
            "initialState": initial,
            "states": ["a", "b"],
            "transitions": [{"source": "a", "target": "b", "event": "go"}]
        })
    }

    #[test]
    fn test_seed_loads_and_skips() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.json", doc("beta", "a"));
        write(dir.path(), "a.json", doc("alpha", "a"));
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = MemoryStore::new();
        let report = seed_definitions(&store, dir.path()).unwrap();
        assert_eq!(report.loaded, vec!["alpha", "beta"]);
        assert!(report.skipped.is_empty());

        // A changed file for an existing id does not overwrite
        write(dir.path(), "a.json", doc("alpha", "b"));
        let report = seed_definitions(&store, dir.path()).unwrap();
        assert!(report.loaded.is_empty());
        assert_eq!(report.skipped, vec!["alpha", "beta"]);

        let raw = store.find_definition("alpha").unwrap().unwrap();
        assert_eq!(raw["initialState"], "a");
    }

    #[test]
    fn test_seed_invalid_file() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "broken.json",
            json!({"machineId": "x", "initialState": "nope", "states": ["a"]}),
        );

        let store = MemoryStore::new();
        let err = seed_definitions(&store, dir.path()).unwrap_err();
        match err {
            StorageError::Seed { path, .. } => assert!(path.ends_with("broken.json")),
            other => panic!("unexpected error: {}", other),
        }
        assert!(store.list_definitions().unwrap().is_empty());
    }

    #[test]
    fn test_seed_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let result = seed_definitions(&store, &dir.path().join("absent"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
