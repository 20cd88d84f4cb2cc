//! JSON-file store.
//!
//! Layout under the data directory:
//!
//! ```text
//! definitions/<machineId>.json   StoredDefinition
//! entities/<businessId>.json     EntityState
//! ```
//!
//! Ids made of lowercase letters, digits, `-`, `_` and inner dots name their
//! file directly. Any other id is stored as `~<hex of the id>.json`, so
//! separators and case never reach the filesystem.
//!
//! Everything is loaded into memory on open. Mutations are serialized by a
//! single writer lock, written to a temp file and renamed into place, and
//! only then published to the in-memory maps.

use crate::error::StorageError;
use crate::record::StoredDefinition;
use flexflow_core::{
    CoreError, Definition, DefinitionSource, DefinitionStore, EntityState, EntityStore,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

const DEFINITIONS_DIR: &str = "definitions";
const ENTITIES_DIR: &str = "entities";
/// File name limit on common filesystems.
const MAX_FILE_NAME: usize = 255;
const TMP_SUFFIX: &str = ".json.tmp";

/// File-backed definition and entity store.
pub struct FileStore {
    dir: PathBuf,
    definitions: RwLock<HashMap<String, StoredDefinition>>,
    entities: RwLock<HashMap<String, EntityState>>,
    /// Serializes read-compare-write sequences.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store at the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(DEFINITIONS_DIR))?;
        fs::create_dir_all(dir.join(ENTITIES_DIR))?;

        let store = Self {
            dir,
            definitions: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };

        store.load()?;

        Ok(store)
    }

    /// Returns the data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self) -> Result<(), StorageError> {
        let definitions: Vec<StoredDefinition> = load_records(&self.dir.join(DEFINITIONS_DIR))?;
        let entities: Vec<EntityState> = load_records(&self.dir.join(ENTITIES_DIR))?;

        {
            let mut map = self.definitions.write();
            for stored in definitions {
                map.insert(stored.machine_id.clone(), stored);
            }
        }
        {
            let mut map = self.entities.write();
            for entity in entities {
                map.insert(entity.business_id.clone(), entity);
            }
        }

        tracing::info!(
            "Recovery complete: {} definitions, {} entities from {}",
            self.definitions.read().len(),
            self.entities.read().len(),
            self.dir.display()
        );

        Ok(())
    }

    fn record_path(&self, kind: &str, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.dir.join(kind).join(format!("{}.json", file_stem(key)?)))
    }

    fn put_definition_inner(&self, definition: &Definition) -> Result<bool, StorageError> {
        let stored = StoredDefinition::from_definition(definition)?;
        let path = self.record_path(DEFINITIONS_DIR, &stored.machine_id)?;

        let _guard = self.write_lock.lock();
        if let Some(existing) = self.definitions.read().get(&stored.machine_id) {
            if existing.checksum == stored.checksum {
                return Ok(false);
            }
        }

        write_atomic(&path, &stored)?;
        self.definitions
            .write()
            .insert(stored.machine_id.clone(), stored);
        Ok(true)
    }

    fn insert_inner(&self, entity: EntityState) -> Result<(), StorageError> {
        let path = self.record_path(ENTITIES_DIR, &entity.business_id)?;

        let _guard = self.write_lock.lock();
        if self.entities.read().contains_key(&entity.business_id) {
            return Err(CoreError::EntityExists {
                business_id: entity.business_id,
            }
            .into());
        }

        write_atomic(&path, &entity)?;
        self.entities
            .write()
            .insert(entity.business_id.clone(), entity);
        Ok(())
    }

    fn write_state_inner(
        &self,
        business_id: &str,
        new_state: &str,
        expected_version: u64,
    ) -> Result<EntityState, StorageError> {
        let path = self.record_path(ENTITIES_DIR, business_id)?;

        let _guard = self.write_lock.lock();
        let mut entity = self
            .entities
            .read()
            .get(business_id)
            .cloned()
            .ok_or_else(|| CoreError::EntityNotFound {
                business_id: business_id.to_string(),
            })?;

        if entity.version != expected_version {
            return Err(CoreError::VersionConflict {
                business_id: business_id.to_string(),
                expected: expected_version,
                actual: entity.version,
            }
            .into());
        }

        entity.apply_transition(new_state);
        write_atomic(&path, &entity)?;
        self.entities
            .write()
            .insert(business_id.to_string(), entity.clone());
        Ok(entity)
    }
}

impl DefinitionSource for FileStore {
    fn find_definition(&self, machine_id: &str) -> Result<Option<Value>, CoreError> {
        Ok(self
            .definitions
            .read()
            .get(machine_id)
            .map(|stored| stored.definition.clone()))
    }
}

impl DefinitionStore for FileStore {
    fn put_definition(&self, definition: &Definition) -> Result<bool, CoreError> {
        Ok(self.put_definition_inner(definition)?)
    }

    fn list_definitions(&self) -> Result<Vec<String>, CoreError> {
        let mut ids: Vec<String> = self.definitions.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl EntityStore for FileStore {
    fn insert(&self, entity: EntityState) -> Result<(), CoreError> {
        Ok(self.insert_inner(entity)?)
    }

    fn read(&self, business_id: &str) -> Result<Option<EntityState>, CoreError> {
        Ok(self.entities.read().get(business_id).cloned())
    }

    fn write_state(
        &self,
        business_id: &str,
        new_state: &str,
        expected_version: u64,
    ) -> Result<EntityState, CoreError> {
        Ok(self.write_state_inner(business_id, new_state, expected_version)?)
    }
}

/// Maps a key to the file stem its record is stored under.
fn file_stem(key: &str) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    let plain = !key.starts_with('.')
        && !key.contains("..")
        && key
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.'));
    let stem = if plain {
        key.to_string()
    } else {
        format!("~{}", hex::encode(key))
    };

    if stem.len() + TMP_SUFFIX.len() > MAX_FILE_NAME {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(stem)
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension(&TMP_SUFFIX[1..]);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn load_records<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let file = File::open(&path)?;
            let record = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                StorageError::Corruption(format!("{}: {}", path.display(), e))
            })?;
            records.push(record);
        }
    }
    Ok(records)
}
