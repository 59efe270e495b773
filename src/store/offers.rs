use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::offer::{Offer, OfferOutcome};

/// How a pending offer ended, delivered to the waiting coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResolution {
    Accepted,
    Declined,
    Expired,
    Withdrawn,
}

/// Why an agent's response was rejected. The engine maps these onto the
/// wire-level error taxonomy with the job's current status in hand.
#[derive(Debug)]
pub enum RespondRejection {
    /// No pending offer for the job: already resolved or never issued.
    NoPendingOffer,
    /// The decision window has closed; the expiry timer owns the bookkeeping.
    DeadlinePassed,
    /// A pending offer exists but is held by a different agent.
    DifferentAgent,
    /// The acceptance compare-and-set chain failed.
    AcceptFailed(DispatchError),
}

struct ActiveOffer {
    offer: Offer,
    wake: Option<oneshot::Sender<OfferResolution>>,
}

/// In-flight offers, one slot per job. The slot's entry lock serializes the
/// three resolution paths (agent response, deadline expiry, job withdrawal)
/// so exactly one of them resolves each offer. Resolved offers move to an
/// immutable log.
#[derive(Default)]
pub struct OfferBoard {
    active: DashMap<Uuid, ActiveOffer>,
    log: DashMap<Uuid, Offer>,
}

impl OfferBoard {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            log: DashMap::new(),
        }
    }

    /// Issues a pending offer for `job_id`. The coordinator is the only
    /// caller and never overlaps offers for one job; a still-pending slot
    /// here means that invariant broke upstream.
    pub fn open(
        &self,
        job_id: Uuid,
        agent_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<(Offer, oneshot::Receiver<OfferResolution>), DispatchError> {
        let offer = Offer::new(job_id, agent_id, Utc::now(), deadline);
        let (wake_tx, wake_rx) = oneshot::channel();

        let previous = self.active.insert(
            job_id,
            ActiveOffer {
                offer: offer.clone(),
                wake: Some(wake_tx),
            },
        );

        if let Some(prev) = previous {
            if prev.offer.outcome == OfferOutcome::Pending {
                self.active.remove(&job_id);
                return Err(DispatchError::Internal(format!(
                    "job {job_id} already had a pending offer to agent {}",
                    prev.offer.agent_id
                )));
            }
        }

        Ok((offer, wake_rx))
    }

    /// Resolves the pending offer by agent decision. For an accept,
    /// `on_accept` runs the assignment compare-and-set chain while the offer
    /// slot is held, so a concurrent expiry or withdrawal cannot interleave.
    pub fn respond<F>(
        &self,
        job_id: Uuid,
        agent_id: Uuid,
        accept: bool,
        on_accept: F,
    ) -> Result<(), RespondRejection>
    where
        F: FnOnce() -> Result<(), DispatchError>,
    {
        let result = {
            let mut entry = match self.active.get_mut(&job_id) {
                Some(entry) => entry,
                None => return Err(RespondRejection::NoPendingOffer),
            };
            let active = entry.value_mut();

            if active.offer.outcome != OfferOutcome::Pending {
                return Err(RespondRejection::NoPendingOffer);
            }
            if active.offer.agent_id != agent_id {
                return Err(RespondRejection::DifferentAgent);
            }
            if Utc::now() > active.offer.deadline {
                return Err(RespondRejection::DeadlinePassed);
            }

            let (resolution, result) = if accept {
                match on_accept() {
                    Ok(()) => (OfferResolution::Accepted, Ok(())),
                    Err(DispatchError::AgentEngaged) => (
                        OfferResolution::Declined,
                        Err(RespondRejection::AcceptFailed(DispatchError::AgentEngaged)),
                    ),
                    Err(err) => (
                        OfferResolution::Withdrawn,
                        Err(RespondRejection::AcceptFailed(err)),
                    ),
                }
            } else {
                (OfferResolution::Declined, Ok(()))
            };

            active.offer.outcome = match resolution {
                OfferResolution::Accepted => OfferOutcome::Accepted,
                OfferResolution::Declined => OfferOutcome::Declined,
                OfferResolution::Expired => OfferOutcome::Expired,
                OfferResolution::Withdrawn => OfferOutcome::Withdrawn,
            };
            self.log.insert(active.offer.id, active.offer.clone());

            if let Some(wake) = active.wake.take() {
                let _ = wake.send(resolution);
            }

            result
        };

        self.active
            .remove_if(&job_id, |_, a| a.offer.outcome != OfferOutcome::Pending);

        result
    }

    /// Deadline expiry, called by the coordinator after its timer fires.
    /// Returns the expired offer, or `None` if a response won the race.
    pub fn expire(&self, job_id: Uuid, offer_id: Uuid) -> Option<Offer> {
        let expired = {
            let mut entry = self.active.get_mut(&job_id)?;
            let active = entry.value_mut();

            if active.offer.id != offer_id || active.offer.outcome != OfferOutcome::Pending {
                return None;
            }

            active.offer.outcome = OfferOutcome::Expired;
            active.wake = None;
            self.log.insert(active.offer.id, active.offer.clone());
            active.offer.clone()
        };

        self.active
            .remove_if(&job_id, |_, a| a.offer.outcome != OfferOutcome::Pending);

        Some(expired)
    }

    /// Resolves a pending offer as withdrawn because its job was cancelled.
    pub fn withdraw(&self, job_id: Uuid) -> Option<Offer> {
        let withdrawn = {
            let mut entry = self.active.get_mut(&job_id)?;
            let active = entry.value_mut();

            if active.offer.outcome != OfferOutcome::Pending {
                return None;
            }

            active.offer.outcome = OfferOutcome::Withdrawn;
            self.log.insert(active.offer.id, active.offer.clone());

            if let Some(wake) = active.wake.take() {
                let _ = wake.send(OfferResolution::Withdrawn);
            }

            active.offer.clone()
        };

        self.active
            .remove_if(&job_id, |_, a| a.offer.outcome != OfferOutcome::Pending);

        Some(withdrawn)
    }

    pub fn pending_for_job(&self, job_id: Uuid) -> Option<Offer> {
        self.active
            .get(&job_id)
            .filter(|e| e.value().offer.outcome == OfferOutcome::Pending)
            .map(|e| e.value().offer.clone())
    }

    /// Every offer ever issued: pending slots first, then the resolved log,
    /// oldest first.
    pub fn all(&self) -> Vec<Offer> {
        let mut offers: Vec<Offer> = self
            .active
            .iter()
            .map(|e| e.value().offer.clone())
            .chain(self.log.iter().map(|e| e.value().clone()))
            .collect();
        offers.sort_by_key(|o| o.issued_at);
        offers
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{OfferBoard, OfferResolution, RespondRejection};
    use crate::error::DispatchError;
    use crate::models::offer::OfferOutcome;

    #[test]
    fn second_open_while_pending_is_rejected() {
        let board = OfferBoard::new();
        let job = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(15);

        board.open(job, Uuid::new_v4(), deadline).unwrap();
        let err = board.open(job, Uuid::new_v4(), deadline).unwrap_err();

        assert!(matches!(err, DispatchError::Internal(_)));
    }

    #[test]
    fn respond_from_non_offered_agent_is_rejected() {
        let board = OfferBoard::new();
        let job = Uuid::new_v4();
        let offered = Uuid::new_v4();
        let other = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(15);

        board.open(job, offered, deadline).unwrap();

        let err = board.respond(job, other, true, || Ok(())).unwrap_err();
        assert!(matches!(err, RespondRejection::DifferentAgent));

        // The real candidate's offer is untouched.
        assert_eq!(board.pending_for_job(job).unwrap().agent_id, offered);
    }

    #[tokio::test]
    async fn accept_resolves_once_and_wakes_coordinator() {
        let board = OfferBoard::new();
        let job = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(15);

        let (_, rx) = board.open(job, agent, deadline).unwrap();

        board.respond(job, agent, true, || Ok(())).unwrap();
        assert_eq!(rx.await.unwrap(), OfferResolution::Accepted);

        // A duplicate response finds nothing pending.
        let err = board.respond(job, agent, true, || Ok(())).unwrap_err();
        assert!(matches!(err, RespondRejection::NoPendingOffer));
    }

    #[test]
    fn expire_loses_to_settled_response() {
        let board = OfferBoard::new();
        let job = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(15);

        let (offer, _rx) = board.open(job, agent, deadline).unwrap();
        board.respond(job, agent, false, || Ok(())).unwrap();

        assert!(board.expire(job, offer.id).is_none());

        let logged: Vec<_> = board.all();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].outcome, OfferOutcome::Declined);
    }

    #[test]
    fn withdraw_resolves_pending_offer() {
        let board = OfferBoard::new();
        let job = Uuid::new_v4();
        let deadline = Utc::now() + Duration::seconds(15);

        board.open(job, Uuid::new_v4(), deadline).unwrap();
        let withdrawn = board.withdraw(job).unwrap();

        assert_eq!(withdrawn.outcome, OfferOutcome::Withdrawn);
        assert!(board.pending_for_job(job).is_none());
    }
}
