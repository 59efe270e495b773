use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::job::{Actor, Job, JobStatus, StatusEntry};

/// Authoritative record of every job. All status changes funnel through
/// [`JobRegistry::transition`], a compare-and-set applied under the job's
/// map entry lock; two racing actors can never both win the same change.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    pub fn create(&self, job: Job) -> Uuid {
        let id = job.id;
        self.jobs.insert(id, job);
        id
    }

    pub fn get(&self, job_id: Uuid) -> Result<Job, DispatchError> {
        self.jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("job {job_id} not found")))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Applies `to` only if the job currently sits in one of `from`.
    /// The history entry is appended under the same lock, so history order
    /// is the order transitions were actually applied.
    pub fn transition(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        actor: Actor,
    ) -> Result<Job, DispatchError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| DispatchError::NotFound(format!("job {job_id} not found")))?;

        let job = entry.value_mut();
        if !from.contains(&job.status) {
            return Err(DispatchError::StaleTransition {
                current: job.status,
            });
        }

        job.status = to;
        job.history.push(StatusEntry {
            status: to,
            actor,
            at: Utc::now(),
        });

        Ok(job.clone())
    }

    /// Acceptance compare-and-set: moves the job to `Accepted` and stamps the
    /// assignment under one entry lock, so no observer can see the job
    /// accepted without its agent (or vice versa).
    pub fn accept(
        &self,
        job_id: Uuid,
        from: &[JobStatus],
        agent_id: Uuid,
    ) -> Result<Job, DispatchError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| DispatchError::NotFound(format!("job {job_id} not found")))?;

        let job = entry.value_mut();
        if !from.contains(&job.status) {
            return Err(DispatchError::StaleTransition {
                current: job.status,
            });
        }

        let now = Utc::now();
        job.status = JobStatus::Accepted;
        job.assigned_agent = Some(agent_id);
        job.assigned_at = Some(now);
        job.history.push(StatusEntry {
            status: JobStatus::Accepted,
            actor: Actor::Agent(agent_id),
            at: now,
        });

        Ok(job.clone())
    }

    /// Attaches the cancellation reason after a successful cancel transition.
    pub fn record_cancel_reason(
        &self,
        job_id: Uuid,
        reason: Option<String>,
    ) -> Result<Job, DispatchError> {
        let mut entry = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| DispatchError::NotFound(format!("job {job_id} not found")))?;

        let job = entry.value_mut();
        job.cancel_reason = reason;

        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::JobRegistry;
    use crate::error::DispatchError;
    use crate::models::agent::GeoPoint;
    use crate::models::job::{Actor, Job, JobStatus, ServiceKind};

    fn ride_job() -> Job {
        Job::new(
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
        )
    }

    #[test]
    fn transition_applies_when_source_matches() {
        let registry = JobRegistry::new();
        let id = registry.create(ride_job());

        let job = registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();

        assert_eq!(job.status, JobStatus::Searching);
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn transition_rejects_stale_source() {
        let registry = JobRegistry::new();
        let id = registry.create(ride_job());

        registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();

        let err = registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::StaleTransition {
                current: JobStatus::Searching
            }
        ));
    }

    #[test]
    fn only_one_of_two_racing_transitions_wins() {
        let registry = JobRegistry::new();
        let id = registry.create(ride_job());
        registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();

        let agent = Actor::Agent(Uuid::new_v4());
        let requester = Actor::Requester(Uuid::new_v4());

        let accept = registry.transition(
            id,
            &[JobStatus::Searching, JobStatus::Offered],
            JobStatus::Accepted,
            agent,
        );
        let cancel = registry.transition(
            id,
            &[JobStatus::Searching, JobStatus::Offered],
            JobStatus::CancelledByRequester,
            requester,
        );

        assert!(accept.is_ok());
        assert!(cancel.is_err());
    }

    #[test]
    fn accept_stamps_assignment_atomically() {
        let registry = JobRegistry::new();
        let id = registry.create(ride_job());
        let agent = Uuid::new_v4();

        registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();

        let job = registry
            .accept(id, &[JobStatus::Searching, JobStatus::Offered], agent)
            .unwrap();
        assert_eq!(job.status, JobStatus::Accepted);
        assert_eq!(job.assigned_agent, Some(agent));
        assert!(job.assigned_at.is_some());

        let err = registry
            .accept(id, &[JobStatus::Searching, JobStatus::Offered], Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleTransition { .. }));
    }

    #[test]
    fn history_records_transitions_in_applied_order() {
        let registry = JobRegistry::new();
        let id = registry.create(ride_job());
        let agent = Actor::Agent(Uuid::new_v4());

        registry
            .transition(id, &[JobStatus::Requested], JobStatus::Searching, Actor::System)
            .unwrap();
        registry
            .transition(id, &[JobStatus::Searching], JobStatus::Offered, Actor::System)
            .unwrap();
        registry
            .transition(id, &[JobStatus::Offered], JobStatus::Accepted, agent)
            .unwrap();

        let statuses: Vec<_> = registry
            .get(id)
            .unwrap()
            .history
            .iter()
            .map(|e| e.status)
            .collect();

        assert_eq!(
            statuses,
            vec![
                JobStatus::Requested,
                JobStatus::Searching,
                JobStatus::Offered,
                JobStatus::Accepted
            ]
        );
    }
}
