//! # flexflow-core
//!
//! Declarative state machine engine for flexflow.
//!
//! This crate provides:
//! - Machine definition parsing and validation
//! - Guard/action plugin registry
//! - Compiled-machine cache with single compilation per machine
//! - Transition evaluation
//! - Persistence contracts and the entity lifecycle service

pub mod builtin;
pub mod compiler;
pub mod definition;
pub mod engine;
pub mod entity;
pub mod error;
pub mod plugin;
pub mod service;
pub mod store;

pub use builtin::{HeaderValueGuard, LogAction};
pub use compiler::{CompiledMachine, MachineCache};
pub use definition::{Definition, DefinitionDocument, PluginRef, Transition};
pub use engine::{Outcome, TransitionEngine};
pub use entity::EntityState;
pub use error::CoreError;
pub use plugin::{
    Action, FnAction, FnGuard, Guard, Headers, Params, PluginError, PluginKind, PluginRegistry,
    PluginRegistryBuilder, TransitionContext, ENTITY_ID_HEADER,
};
pub use service::EntityService;
pub use store::{DefinitionSource, DefinitionStore, EntityStore};
