use uuid::Uuid;

use crate::error::DispatchError;
use crate::state::AppState;

pub async fn enqueue_job(state: &AppState, job_id: Uuid) -> Result<(), DispatchError> {
    state
        .job_tx
        .send(job_id)
        .await
        .map_err(|err| DispatchError::Internal(format!("dispatch queue send failed: {err}")))?;

    state.metrics.jobs_in_queue.inc();
    Ok(())
}
