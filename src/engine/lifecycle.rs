use tracing::info;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::job::{Actor, Job, JobStatus};
use crate::state::AppState;

/// Moves an accepted job one step along the forward chain
/// `Accepted -> EnRouteToOrigin -> ArrivedAtOrigin -> InProgress -> Completed`.
/// Only the assigned agent may advance; each step is a single-step
/// compare-and-set so duplicate or reordered calls surface as
/// `StaleTransition` instead of skipping states.
pub fn advance(
    state: &AppState,
    job_id: Uuid,
    agent_id: Uuid,
    to: JobStatus,
) -> Result<Job, DispatchError> {
    let from = to.predecessor().ok_or_else(|| {
        DispatchError::BadRequest(format!("{to:?} is not an agent-advanceable status"))
    })?;

    // `assigned_agent` is write-once at acceptance, so this check cannot
    // go stale between the read and the transition below.
    let job = state.jobs.get(job_id)?;
    if job.assigned_agent != Some(agent_id) {
        return Err(DispatchError::BadRequest(format!(
            "agent {agent_id} is not assigned to job {job_id}"
        )));
    }

    let job = state
        .jobs
        .transition(job_id, &[from], to, Actor::Agent(agent_id))?;

    if to == JobStatus::Completed {
        state.agents.release(agent_id, job_id);
    }

    state.fanout.job_status_changed(&job);
    info!(job_id = %job_id, agent_id = %agent_id, status = ?to, "job advanced");

    Ok(job)
}

/// Cancellation policy:
/// - the requester may cancel any time before the service is underway
///   (`Requested` through `ArrivedAtOrigin`);
/// - the assigned agent may cancel between acceptance and arrival;
/// - once `InProgress`, cancellation needs an override outside this engine.
///
/// The cancel races acceptance through the same job compare-and-set; the
/// loser gets the corresponding rejection. A pending offer on the job is
/// withdrawn so its coordinator stops offering.
pub fn cancel(
    state: &AppState,
    job_id: Uuid,
    actor: Actor,
    reason: Option<String>,
) -> Result<Job, DispatchError> {
    const REQUESTER_CANCELLABLE: &[JobStatus] = &[
        JobStatus::Requested,
        JobStatus::Searching,
        JobStatus::Offered,
        JobStatus::Accepted,
        JobStatus::EnRouteToOrigin,
        JobStatus::ArrivedAtOrigin,
    ];
    const AGENT_CANCELLABLE: &[JobStatus] = &[
        JobStatus::Accepted,
        JobStatus::EnRouteToOrigin,
        JobStatus::ArrivedAtOrigin,
    ];

    let current = state.jobs.get(job_id)?;

    let (from, to) = match actor {
        Actor::Requester(requester_id) => {
            if current.requester_id != requester_id {
                return Err(DispatchError::BadRequest(format!(
                    "requester {requester_id} does not own job {job_id}"
                )));
            }
            (REQUESTER_CANCELLABLE, JobStatus::CancelledByRequester)
        }
        Actor::Agent(agent_id) => {
            if current.assigned_agent != Some(agent_id) {
                return Err(DispatchError::BadRequest(format!(
                    "agent {agent_id} is not assigned to job {job_id}"
                )));
            }
            (AGENT_CANCELLABLE, JobStatus::CancelledByAgent)
        }
        Actor::System => {
            return Err(DispatchError::BadRequest(
                "system cancellations go through the dispatch engine".to_string(),
            ));
        }
    };

    state.jobs.transition(job_id, from, to, actor)?;
    let job = state.jobs.record_cancel_reason(job_id, reason)?;

    if state.offers.withdraw(job_id).is_some() {
        info!(job_id = %job_id, "pending offer withdrawn by cancellation");
    }
    if let Some(agent_id) = job.assigned_agent {
        state.agents.release(agent_id, job_id);
    }

    state.fanout.job_status_changed(&job);
    info!(job_id = %job_id, status = ?to, "job cancelled");

    Ok(job)
}
