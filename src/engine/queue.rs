use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn enqueue_dispatch(state: &AppState, trip_id: Uuid) -> Result<(), AppError> {
    state
        .dispatch_tx
        .send(trip_id)
        .await
        .map_err(|err| AppError::Transport(format!("dispatch queue send failed: {err}")))?;

    state.metrics.trips_awaiting_dispatch.inc();
    Ok(())
}
