use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OfferDecision {
    Accept,
    Decline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OfferOutcome {
    Pending,
    Accepted,
    Declined,
    Expired,
    /// The job was cancelled while this offer was still pending.
    Withdrawn,
}

/// A time-bounded proposal of one job to one agent. Resolved exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub job_id: Uuid,
    pub agent_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub outcome: OfferOutcome,
}

impl Offer {
    pub fn new(
        job_id: Uuid,
        agent_id: Uuid,
        issued_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            agent_id,
            issued_at,
            deadline,
            outcome: OfferOutcome::Pending,
        }
    }
}
