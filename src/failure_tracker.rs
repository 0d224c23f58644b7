//! Sliding-window circuit breaker over per-definition terminal failures.
//!
//! A definition "trips" when its count of progress-terminal instances
//! (`failed`/`timed_out` with the retry budget exhausted) within its
//! configured window reaches its threshold. A tripped definition is excluded
//! from resolution until an admin re-enables or edits it; the breaker itself
//! never resets automatically — it reflects the instance store's history as
//! of the query, so once old failures age out of the window it re-closes.

use chrono::Utc;

use crate::definition::CheckpointDefinition;
use crate::error::StoreResult;
use crate::store::{DefinitionStore, InstanceStore};

/// Read-only check: has this definition accumulated enough terminal failures
/// in its configured window to be considered tripped?
#[tracing::instrument(skip(instances, definition), fields(definition_id = %definition.id))]
pub async fn is_tripped(
    instances: &dyn InstanceStore,
    definition: &CheckpointDefinition,
) -> StoreResult<bool> {
    if definition.policy.circuit_breaker_threshold == 0 {
        return Ok(false);
    }
    let since = Utc::now()
        - chrono::Duration::minutes(i64::from(definition.policy.circuit_breaker_window_minutes));
    let count = instances
        .count_terminal_failures_since(definition.id, since)
        .await?;
    let tripped = count >= definition.policy.circuit_breaker_threshold;
    if tripped {
        tracing::warn!(
            definition_id = %definition.id,
            control_type = %definition.control_type,
            count,
            threshold = definition.policy.circuit_breaker_threshold,
            "checkpoint definition circuit breaker tripped"
        );
    }
    Ok(tripped)
}

/// Called after a terminal failure (`fail`/`timeout`) is recorded: re-checks
/// the window and, if the threshold is now met, force-disables the
/// definition and logs a single warning. Re-enabling is an admin action; the
/// tracker never flips a definition back on.
#[tracing::instrument(skip(definitions, instances, definition), fields(definition_id = %definition.id))]
pub async fn record_terminal_failure(
    definitions: &dyn DefinitionStore,
    instances: &dyn InstanceStore,
    definition: &CheckpointDefinition,
) -> StoreResult<()> {
    if !definition.enabled {
        return Ok(());
    }
    if is_tripped(instances, definition).await? {
        definitions.toggle(definition.id, false).await?;
    }
    Ok(())
}
