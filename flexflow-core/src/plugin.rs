//! Guard and action plugins.
//!
//! Definitions refer to guards and actions by name. Implementations are
//! registered explicitly at startup through [`PluginRegistryBuilder`]; the
//! resulting [`PluginRegistry`] is immutable and shared by every compiled
//! machine.
//!
//! Plugins receive a [`TransitionContext`] describing the attempted
//! transition and the [`Params`] block from the definition. Guards must be
//! pure predicates. Actions may perform side effects but run only after the
//! guard of their transition has passed.

use crate::error::CoreError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied headers passed through a trigger to guards and actions.
pub type Headers = Map<String, Value>;

/// Header carrying the business id of the entity being triggered.
pub const ENTITY_ID_HEADER: &str = "entityId";

/// Errors raised by plugin implementations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("parameter '{name}' must be {expected}")]
    InvalidParam { name: String, expected: &'static str },

    #[error("{0}")]
    Failed(String),
}

/// Which registry a plugin lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Guard,
    Action,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Guard => f.write_str("guard"),
            PluginKind::Action => f.write_str("action"),
        }
    }
}

/// Parameters from a definition's `params` block.
///
/// Accessors return `Ok(None)` for absent or null keys and
/// [`PluginError::InvalidParam`] when the value has the wrong shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw value for a key, treating null as absent.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Result<Option<&str>, PluginError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(invalid(key, "a string")),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, PluginError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(invalid(key, "a boolean")),
        }
    }

    pub fn i64(&self, key: &str) -> Result<Option<i64>, PluginError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| invalid(key, "an integer")),
            Some(_) => Err(invalid(key, "an integer")),
        }
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>, PluginError> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(key, "a number")),
            Some(_) => Err(invalid(key, "a number")),
        }
    }

    /// Like [`Params::str`], but absence is an error.
    pub fn require_str(&self, key: &str) -> Result<&str, PluginError> {
        self.str(key)?
            .ok_or_else(|| PluginError::MissingParam(key.to_string()))
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn invalid(key: &str, expected: &'static str) -> PluginError {
    PluginError::InvalidParam {
        name: key.to_string(),
        expected,
    }
}

/// View of a transition attempt handed to guards and actions.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    event: &'a str,
    source: &'a str,
    target: &'a str,
    headers: &'a Headers,
}

impl<'a> TransitionContext<'a> {
    pub fn new(event: &'a str, source: &'a str, target: &'a str, headers: &'a Headers) -> Self {
        Self {
            event,
            source,
            target,
            headers,
        }
    }

    pub fn event(&self) -> &'a str {
        self.event
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn target(&self) -> &'a str {
        self.target
    }

    pub fn headers(&self) -> &'a Headers {
        self.headers
    }

    pub fn header(&self, name: &str) -> Option<&'a Value> {
        self.headers.get(name)
    }

    /// Business id of the entity, if the caller's headers carry it.
    pub fn entity_id(&self) -> Option<&'a str> {
        self.headers.get(ENTITY_ID_HEADER).and_then(Value::as_str)
    }
}

/// A named predicate gating a transition.
pub trait Guard: Send + Sync {
    /// Name used by definitions to reference this guard.
    fn name(&self) -> &str;

    /// Returns whether the transition may proceed. Must not mutate
    /// external state.
    fn evaluate(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<bool, PluginError>;
}

/// A named side effect run when a transition is taken.
pub trait Action: Send + Sync {
    /// Name used by definitions to reference this action.
    fn name(&self) -> &str;

    fn execute(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<(), PluginError>;
}

/// Guard backed by a closure.
pub struct FnGuard<F> {
    name: String,
    f: F,
}

impl<F> FnGuard<F>
where
    F: Fn(&TransitionContext<'_>, &Params) -> Result<bool, PluginError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Guard for FnGuard<F>
where
    F: Fn(&TransitionContext<'_>, &Params) -> Result<bool, PluginError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<bool, PluginError> {
        (self.f)(ctx, params)
    }
}

/// Action backed by a closure.
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn(&TransitionContext<'_>, &Params) -> Result<(), PluginError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&TransitionContext<'_>, &Params) -> Result<(), PluginError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<(), PluginError> {
        (self.f)(ctx, params)
    }
}

/// Collects plugin implementations before freezing them into a registry.
#[derive(Default)]
pub struct PluginRegistryBuilder {
    guards: Vec<Arc<dyn Guard>>,
    actions: Vec<Arc<dyn Action>>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    pub fn action(mut self, action: impl Action + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Adds the built-in `headerValueGuard` and `logAction`.
    pub fn builtins(self) -> Self {
        self.guard(crate::builtin::HeaderValueGuard)
            .action(crate::builtin::LogAction)
    }

    /// Freezes the registry. Fails if two plugins of the same kind share a name.
    pub fn build(self) -> Result<PluginRegistry, CoreError> {
        let mut guards = HashMap::with_capacity(self.guards.len());
        for guard in self.guards {
            let name = guard.name().to_string();
            if guards.insert(name.clone(), guard).is_some() {
                return Err(duplicate(PluginKind::Guard, &name));
            }
        }

        let mut actions = HashMap::with_capacity(self.actions.len());
        for action in self.actions {
            let name = action.name().to_string();
            if actions.insert(name.clone(), action).is_some() {
                return Err(duplicate(PluginKind::Action, &name));
            }
        }

        tracing::debug!(
            "Plugin registry built: {} guard(s), {} action(s)",
            guards.len(),
            actions.len()
        );

        Ok(PluginRegistry { guards, actions })
    }
}

fn duplicate(kind: PluginKind, name: &str) -> CoreError {
    CoreError::InvalidPlugin {
        reason: format!("{} '{}' registered more than once", kind, name),
    }
}

/// Immutable name → implementation maps for guards and actions.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    guards: HashMap<String, Arc<dyn Guard>>,
    actions: HashMap<String, Arc<dyn Action>>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::new()
    }

    /// Registry holding only the built-in plugins.
    pub fn with_builtins() -> Result<Self, CoreError> {
        Self::builder().builtins().build()
    }

    pub fn guard(&self, name: &str) -> Option<Arc<dyn Guard>> {
        self.guards.get(name).cloned()
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Sorted guard names.
    pub fn guard_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.guards.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Sorted action names.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("guards", &self.guard_names())
            .field("actions", &self.action_names())
            .finish()
    }
}
