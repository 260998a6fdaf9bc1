pub mod attachments;
pub mod conversations;
pub mod evict;

use crate::{AppState, services::CoreResult};

/// Enforce the require-justification flag on mutating admin calls.
pub(crate) fn check_justification(
    state: &AppState,
    justification: Option<&str>,
) -> CoreResult<()> {
    if state.config.admin.require_justification
        && justification.map(str::trim).is_none_or(str::is_empty)
    {
        return Err(crate::services::CoreError::JustificationRequired);
    }
    Ok(())
}
