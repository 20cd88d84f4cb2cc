//! Command execution.

use crate::Commands;
use flexflow_core::{CoreError, EntityService, Headers};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to read '{}': {}", .0.display(), .1)]
    Read(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl CommandError {
    /// Returns the error code shown next to the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            CommandError::Read(..) => "IO_ERROR",
            CommandError::Core(e) => e.error_code(),
        }
    }
}

/// Executes a command and returns its JSON output.
pub fn execute(service: &EntityService, cmd: Commands) -> Result<Value, CommandError> {
    match cmd {
        Commands::Load { file } => {
            let content =
                std::fs::read_to_string(&file).map_err(|e| CommandError::Read(file.clone(), e))?;
            let raw: Value = serde_json::from_str(&content).map_err(CoreError::from)?;
            let changed = service.put_definition(&raw)?;
            Ok(json!({
                "machineId": raw["machineId"],
                "changed": changed,
            }))
        }

        Commands::Create {
            business_id,
            machine_id,
        } => {
            let entity = service.create_entity(&business_id, &machine_id)?;
            Ok(to_value(&entity))
        }

        Commands::Trigger {
            business_id,
            event,
            headers,
        } => {
            let headers: Headers = headers.into_iter().collect();
            let changed = service.trigger_event(&business_id, &event, &headers)?;
            let entity = service.get_entity(&business_id)?;
            Ok(json!({
                "changed": changed,
                "entity": entity,
            }))
        }

        Commands::Get { business_id } => match service.get_entity(&business_id)? {
            Some(entity) => Ok(to_value(&entity)),
            None => Err(CoreError::EntityNotFound { business_id }.into()),
        },

        Commands::Events { business_id } => {
            let events = service.available_events(&business_id)?;
            Ok(json!({
                "businessId": business_id,
                "events": events,
            }))
        }
    }
}

/// Parses a `key=value` header. The value is read as JSON when it parses,
/// otherwise as a plain string.
pub fn parse_header(arg: &str) -> Result<(String, Value), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", arg))?;
    if key.is_empty() {
        return Err(format!("empty header name in '{}'", arg));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Formats JSON for display.
pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
