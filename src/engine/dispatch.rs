use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::eligibility::candidates;
use crate::error::DispatchError;
use crate::models::job::{Actor, JobStatus};
use crate::state::AppState;
use crate::store::offers::{OfferResolution, RespondRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Assigned,
    NoAgentFound,
    Cancelled,
}

impl DispatchOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            DispatchOutcome::Assigned => "assigned",
            DispatchOutcome::NoAgentFound => "no_agent_found",
            DispatchOutcome::Cancelled => "cancelled",
        }
    }
}

/// Receives newly created jobs off the dispatch queue and runs one
/// coordinator task per job. Unrelated jobs proceed fully in parallel;
/// everything per-job stays inside its own task plus the per-key store
/// locks.
pub async fn run_dispatch_engine(state: Arc<AppState>, mut job_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(job_id) = job_rx.recv().await {
        state.metrics.jobs_in_queue.dec();

        let state = state.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            match dispatch_job(&state, job_id).await {
                Ok(outcome) => {
                    state
                        .metrics
                        .dispatch_latency_seconds
                        .with_label_values(&[outcome.as_label()])
                        .observe(start.elapsed().as_secs_f64());
                }
                Err(err) => {
                    state
                        .metrics
                        .dispatch_latency_seconds
                        .with_label_values(&["error"])
                        .observe(start.elapsed().as_secs_f64());
                    error!(job_id = %job_id, error = %err, "failed to dispatch job");
                }
            }
        });
    }

    warn!("dispatch engine stopped: queue channel closed");
}

/// Drives one job from `Searching` to an assignment or a terminal outcome:
/// bounded scan rounds with a widening radius, strictly sequential offers,
/// one decision window each.
pub async fn dispatch_job(
    state: &Arc<AppState>,
    job_id: Uuid,
) -> Result<DispatchOutcome, DispatchError> {
    let job = match state.jobs.transition(
        job_id,
        &[JobStatus::Requested],
        JobStatus::Searching,
        Actor::System,
    ) {
        Ok(job) => {
            state.fanout.job_status_changed(&job);
            job
        }
        Err(DispatchError::StaleTransition { current }) => {
            info!(job_id = %job_id, status = ?current, "job left requested state before dispatch");
            return Ok(DispatchOutcome::Cancelled);
        }
        Err(err) => return Err(err),
    };

    let cfg = &state.config;
    let window = chrono::Duration::from_std(cfg.offer_window)
        .map_err(|err| DispatchError::Internal(format!("offer window out of range: {err}")))?;
    let mut radius = cfg.initial_radius_m;

    for round in 0..cfg.max_scan_rounds {
        if round > 0 {
            sleep(cfg.rescan_interval).await;
            radius = (radius * cfg.radius_growth_factor).min(cfg.max_radius_m);
        }

        let pool = candidates(state, &job, radius);
        if pool.is_empty() {
            debug!(job_id = %job_id, round, radius_m = radius, "no eligible agents in radius");
            continue;
        }

        for candidate in pool {
            // Marks the job offered; doubles as the liveness check against
            // a requester cancellation racing the scan.
            match state.jobs.transition(
                job_id,
                &[JobStatus::Searching, JobStatus::Offered],
                JobStatus::Offered,
                Actor::System,
            ) {
                Ok(_) => {}
                Err(DispatchError::StaleTransition { current }) => {
                    info!(job_id = %job_id, status = ?current, "job resolved while offers were in flight");
                    return Ok(DispatchOutcome::Cancelled);
                }
                Err(err) => return Err(err),
            }

            // The pool is a snapshot; skip agents engaged or gone offline since.
            match state.agents.get(candidate.agent_id) {
                Ok(agent) if agent.online && agent.current_job.is_none() => {}
                _ => continue,
            }

            let resolution = offer_candidate(state, job_id, candidate.agent_id, window).await?;
            state
                .metrics
                .offers_total
                .with_label_values(&[resolution_label(resolution)])
                .inc();

            match resolution {
                OfferResolution::Accepted => {
                    info!(job_id = %job_id, agent_id = %candidate.agent_id, "job assigned");
                    return Ok(DispatchOutcome::Assigned);
                }
                OfferResolution::Declined | OfferResolution::Expired => continue,
                OfferResolution::Withdrawn => {
                    info!(job_id = %job_id, "job cancelled while offer pending");
                    return Ok(DispatchOutcome::Cancelled);
                }
            }
        }
    }

    match state.jobs.transition(
        job_id,
        &[JobStatus::Searching, JobStatus::Offered],
        JobStatus::CancelledNoAgentFound,
        Actor::System,
    ) {
        Ok(job) => {
            state.fanout.job_status_changed(&job);
            warn!(job_id = %job_id, rounds = cfg.max_scan_rounds, "no agent found");
            Ok(DispatchOutcome::NoAgentFound)
        }
        Err(DispatchError::StaleTransition { .. }) => Ok(DispatchOutcome::Cancelled),
        Err(err) => Err(err),
    }
}

/// Issues one offer and waits out its decision window. The board entry is
/// the authority on which of {response, expiry, withdrawal} settled first.
async fn offer_candidate(
    state: &Arc<AppState>,
    job_id: Uuid,
    agent_id: Uuid,
    window: chrono::Duration,
) -> Result<OfferResolution, DispatchError> {
    let deadline = Utc::now() + window;
    let (offer, mut wake_rx) = state.offers.open(job_id, agent_id, deadline)?;

    state.fanout.offer_issued(&offer);
    info!(job_id = %job_id, agent_id = %agent_id, deadline = %deadline, "offer issued");

    match timeout(state.config.offer_window, &mut wake_rx).await {
        Ok(Ok(resolution)) => Ok(resolution),
        Ok(Err(_)) | Err(_) => match state.offers.expire(job_id, offer.id) {
            Some(_) => {
                info!(job_id = %job_id, agent_id = %agent_id, "offer expired");
                Ok(OfferResolution::Expired)
            }
            // A response settled the offer just as the timer fired; the
            // wake channel already carries the real resolution.
            None => Ok(wake_rx.try_recv().unwrap_or(OfferResolution::Expired)),
        },
    }
}

/// Agent-side resolution of a pending offer. The acceptance chain — agent
/// record first, then the job registry — runs under the offer slot's lock,
/// so a concurrent expiry, cancellation, or second accept observes either
/// nothing or the settled result, never an intermediate state.
pub fn respond_to_offer(
    state: &AppState,
    job_id: Uuid,
    agent_id: Uuid,
    accept: bool,
) -> Result<(), DispatchError> {
    state.agents.get(agent_id)?;

    let result = state.offers.respond(job_id, agent_id, accept, || {
        state.agents.assign(agent_id, job_id)?;

        match state.jobs.accept(
            job_id,
            &[JobStatus::Searching, JobStatus::Offered],
            agent_id,
        ) {
            Ok(job) => {
                state.fanout.job_status_changed(&job);
                Ok(())
            }
            Err(err) => {
                state.agents.release(agent_id, job_id);
                Err(err)
            }
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(RespondRejection::NoPendingOffer) => {
            let job = state.jobs.get(job_id)?;
            match job.status {
                JobStatus::Requested | JobStatus::Searching | JobStatus::Offered => {
                    Err(DispatchError::OfferExpired)
                }
                _ => Err(DispatchError::JobNoLongerAvailable),
            }
        }
        Err(RespondRejection::DeadlinePassed) => Err(DispatchError::OfferExpired),
        Err(RespondRejection::DifferentAgent) => Err(DispatchError::JobNoLongerAvailable),
        Err(RespondRejection::AcceptFailed(err)) => match err {
            DispatchError::AgentEngaged => Err(DispatchError::AgentEngaged),
            DispatchError::StaleTransition { .. } => Err(DispatchError::JobNoLongerAvailable),
            other => Err(other),
        },
    }
}

fn resolution_label(resolution: OfferResolution) -> &'static str {
    match resolution {
        OfferResolution::Accepted => "accepted",
        OfferResolution::Declined => "declined",
        OfferResolution::Expired => "expired",
        OfferResolution::Withdrawn => "withdrawn",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::respond_to_offer;
    use crate::config::Config;
    use crate::error::DispatchError;
    use crate::models::agent::{AgentRecord, GeoPoint};
    use crate::models::job::{Actor, Job, JobStatus, ServiceKind};
    use crate::state::AppState;

    fn test_config() -> Config {
        Config {
            http_port: 0,
            log_level: "info".to_string(),
            job_queue_size: 16,
            event_buffer_size: 16,
            offer_window: Duration::from_secs(15),
            rescan_interval: Duration::from_millis(50),
            max_scan_rounds: 2,
            initial_radius_m: 3000.0,
            radius_growth_factor: 1.5,
            max_radius_m: 15000.0,
            position_staleness: Duration::from_secs(30),
            average_speed_mps: 8.0,
            min_eta_secs: 60,
        }
    }

    fn register(state: &AppState, id_seed: u128) -> Uuid {
        state.agents.register(AgentRecord {
            id: Uuid::from_u128(id_seed),
            name: format!("agent-{id_seed}"),
            online: true,
            capabilities: vec![ServiceKind::Ride],
            rating: 4.5,
            current_job: None,
            updated_at: Utc::now(),
        })
    }

    /// Creates a job sitting in `Offered` with a live offer to `agent_id`.
    fn offered_job(state: &AppState, agent_id: Uuid) -> Uuid {
        let job = Job::new(
            Uuid::new_v4(),
            ServiceKind::Ride,
            GeoPoint {
                lat: 52.52,
                lng: 13.405,
            },
            GeoPoint {
                lat: 52.54,
                lng: 13.42,
            },
        );
        let job_id = state.jobs.create(job);
        state
            .jobs
            .transition(job_id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();
        state
            .jobs
            .transition(job_id, &[JobStatus::Searching], JobStatus::Offered, Actor::System)
            .unwrap();
        state
            .offers
            .open(job_id, agent_id, Utc::now() + chrono::Duration::seconds(15))
            .unwrap();
        job_id
    }

    #[test]
    fn concurrent_accepts_from_two_agents_yield_one_winner() {
        let (state, _job_rx) = AppState::new(test_config());
        let state = Arc::new(state);

        let offered = register(&state, 1);
        let bystander = register(&state, 2);
        let job_id = offered_job(&state, offered);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [offered, bystander]
            .into_iter()
            .map(|agent_id| {
                let state = state.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    respond_to_offer(&state, job_id, agent_id, true)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(DispatchError::JobNoLongerAvailable)
        ));

        let job = state.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.assigned_agent, Some(offered));
        assert_eq!(state.agents.get(offered).unwrap().current_job, Some(job_id));
        assert_eq!(state.agents.get(bystander).unwrap().current_job, None);
    }

    #[test]
    fn agent_racing_two_offers_wins_at_most_one() {
        let (state, _job_rx) = AppState::new(test_config());
        let state = Arc::new(state);

        let agent_id = register(&state, 1);
        let first_job = offered_job(&state, agent_id);
        let second_job = offered_job(&state, agent_id);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [first_job, second_job]
            .into_iter()
            .map(|job_id| {
                let state = state.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    (job_id, respond_to_offer(&state, job_id, agent_id, true))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let wins: Vec<Uuid> = results
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(job_id, _)| *job_id)
            .collect();
        assert_eq!(wins.len(), 1);

        let loser = results
            .iter()
            .find(|(_, r)| r.is_err())
            .map(|(job_id, _)| *job_id)
            .unwrap();

        assert_eq!(state.agents.get(agent_id).unwrap().current_job, Some(wins[0]));
        assert_eq!(state.jobs.get(wins[0]).unwrap().status, JobStatus::Accepted);
        // The losing job is still dispatchable, its offer resolved as declined.
        assert_eq!(state.jobs.get(loser).unwrap().status, JobStatus::Offered);
        assert!(state.offers.pending_for_job(loser).is_none());
    }

    #[tokio::test]
    async fn cancellation_racing_accept_converges_to_cancelled() {
        let (state, _job_rx) = AppState::new(test_config());
        let state = Arc::new(state);

        let agent_id = register(&state, 1);
        let job_id = offered_job(&state, agent_id);
        let requester_id = state.jobs.get(job_id).unwrap().requester_id;

        let accept = {
            let state = state.clone();
            tokio::task::spawn_blocking(move || respond_to_offer(&state, job_id, agent_id, true))
        };
        let cancel = {
            let state = state.clone();
            tokio::task::spawn_blocking(move || {
                crate::engine::lifecycle::cancel(
                    &state,
                    job_id,
                    Actor::Requester(requester_id),
                    None,
                )
            })
        };

        let (accept_res, cancel_res) = (accept.await.unwrap(), cancel.await.unwrap());

        // Requester cancellation is permitted up to arrival, so it lands
        // whether it beat the accept or followed it; a losing accept is
        // told the job is gone, never silently dropped.
        assert!(cancel_res.is_ok());
        if let Err(err) = accept_res {
            assert!(matches!(err, DispatchError::JobNoLongerAvailable));
        }

        let job = state.jobs.get(job_id).unwrap();
        assert_eq!(job.status, JobStatus::CancelledByRequester);
        assert_eq!(state.agents.get(agent_id).unwrap().current_job, None);
        assert!(state.offers.pending_for_job(job_id).is_none());
    }
}
