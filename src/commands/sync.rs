//! Poll commands: on-demand cycles and merge acknowledgment.

use crate::error::AppError;
use crate::services::poller::{CycleReport, Poller};
use crate::services::state_store::PollStateStore;
use chrono::{DateTime, Utc};

/// Run one poll cycle now.
pub async fn poll_now(poller: &Poller) -> Result<CycleReport, AppError> {
    poller.run_cycle(Utc::now()).await
}

/// Mark every merge confirmed so far as seen, ending the celebration.
pub async fn ack_merges(state: &dyn PollStateStore, now: DateTime<Utc>) -> Result<(), AppError> {
    state.set_merged_ack(now).await?;
    log::info!("[sync] Merges acknowledged at {}", now.to_rfc3339());
    Ok(())
}
