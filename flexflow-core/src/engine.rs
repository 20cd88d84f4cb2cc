//! Transition engine - evaluates one event against a compiled machine.

use crate::compiler::CompiledMachine;
use crate::error::CoreError;
use crate::plugin::{Headers, TransitionContext};

/// Result of attempting an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A transition was taken; holds the new state.
    Changed(String),
    /// No candidate matched, every guard rejected, or the state is terminal.
    Unchanged,
}

impl Outcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Outcome::Changed(_))
    }
}

/// Stateless evaluator for single transition attempts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionEngine;

impl TransitionEngine {
    /// Attempts `event` from `current_state`.
    ///
    /// Candidates are tried in document order; the first whose guard passes
    /// (or which has no guard) wins and only its action runs. Terminal states
    /// accept nothing.
    pub fn attempt(
        machine: &CompiledMachine,
        current_state: &str,
        event: &str,
        headers: &Headers,
    ) -> Result<Outcome, CoreError> {
        if !machine.has_state(current_state) {
            return Err(CoreError::UnknownState {
                machine_id: machine.machine_id().to_string(),
                state: current_state.to_string(),
            });
        }

        if machine.is_end_state(current_state) {
            tracing::debug!(
                "State '{}' of machine '{}' is terminal, ignoring event '{}'",
                current_state,
                machine.machine_id(),
                event
            );
            return Ok(Outcome::Unchanged);
        }

        for candidate in machine.candidates(current_state, event) {
            let ctx = TransitionContext::new(event, current_state, candidate.target(), headers);

            if let Some(guard) = candidate.guard() {
                let passed = guard
                    .plugin()
                    .evaluate(&ctx, guard.params())
                    .map_err(|source| CoreError::GuardFailed {
                        name: guard.name().to_string(),
                        source,
                    })?;

                tracing::debug!(
                    "Guard '{}' for '{}' -> '{}' on '{}': {}",
                    guard.name(),
                    current_state,
                    candidate.target(),
                    event,
                    passed
                );

                if !passed {
                    continue;
                }
            }

            if let Some(action) = candidate.action() {
                action
                    .plugin()
                    .execute(&ctx, action.params())
                    .map_err(|source| CoreError::ActionFailed {
                        name: action.name().to_string(),
                        source,
                    })?;
            }

            return Ok(Outcome::Changed(candidate.target().to_string()));
        }

        Ok(Outcome::Unchanged)
    }
}
