//! Built-in plugins available to every definition.

use crate::plugin::{Action, Guard, Params, PluginError, TransitionContext};

/// Passes when a caller header equals a required value.
///
/// Params: `headerName` (string), `requiredValue` (any JSON value).
/// Values compare as JSON, so `"1"` does not equal `1`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderValueGuard;

impl HeaderValueGuard {
    pub const NAME: &'static str = "headerValueGuard";
}

impl Guard for HeaderValueGuard {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<bool, PluginError> {
        let header_name = params.str("headerName")?;
        let required = params.value("requiredValue");

        let (header_name, required) = match (header_name, required) {
            (Some(h), Some(r)) => (h, r),
            _ => {
                tracing::warn!(
                    "[HeaderValueGuard] 'headerName' or 'requiredValue' missing, denying transition"
                );
                return Ok(false);
            }
        };

        let actual = ctx.header(header_name);
        let result = actual == Some(required);

        tracing::info!(
            "[HeaderValueGuard] header '{}': required {}, actual {}, result {}",
            header_name,
            required,
            actual.map(|v| v.to_string()).unwrap_or_else(|| "<absent>".to_string()),
            result
        );

        Ok(result)
    }
}

/// Logs the transition with an optional `message` param.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAction;

impl LogAction {
    pub const NAME: &'static str = "logAction";
}

impl Action for LogAction {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn execute(&self, ctx: &TransitionContext<'_>, params: &Params) -> Result<(), PluginError> {
        let message = params.str("message")?.unwrap_or("Executing LogAction");

        tracing::info!(
            "[LogAction] entity '{}' | {} -> {} | event '{}' | {}",
            ctx.entity_id().unwrap_or("<unknown>"),
            ctx.source(),
            ctx.target(),
            ctx.event(),
            message
        );

        Ok(())
    }
}
