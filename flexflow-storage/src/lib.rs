//! # flexflow-storage
//!
//! Storage adapters for flexflow.
//!
//! This crate provides:
//! - An in-memory store backed by concurrent maps
//! - A JSON-file store that survives restarts
//! - Definition seeding from a directory of JSON documents

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod seed;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::StoredDefinition;
pub use seed::{seed_definitions, SeedReport};
