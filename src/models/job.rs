use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceKind {
    Ride,
    Food,
    Parcel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Requested,
    Searching,
    Offered,
    Accepted,
    EnRouteToOrigin,
    ArrivedAtOrigin,
    InProgress,
    Completed,
    CancelledByRequester,
    CancelledByAgent,
    CancelledNoAgentFound,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::CancelledByRequester
                | JobStatus::CancelledByAgent
                | JobStatus::CancelledNoAgentFound
        )
    }

    /// The single legal predecessor for each agent-driven forward step.
    pub fn predecessor(&self) -> Option<JobStatus> {
        match self {
            JobStatus::EnRouteToOrigin => Some(JobStatus::Accepted),
            JobStatus::ArrivedAtOrigin => Some(JobStatus::EnRouteToOrigin),
            JobStatus::InProgress => Some(JobStatus::ArrivedAtOrigin),
            JobStatus::Completed => Some(JobStatus::InProgress),
            _ => None,
        }
    }
}

/// Who applied a status change. Recorded in the job history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id")]
pub enum Actor {
    Requester(Uuid),
    Agent(Uuid),
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: JobStatus,
    pub actor: Actor,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub service_kind: ServiceKind,
    pub requester_id: Uuid,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub status: JobStatus,
    pub assigned_agent: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub history: Vec<StatusEntry>,
}

impl Job {
    pub fn new(
        requester_id: Uuid,
        service_kind: ServiceKind,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            service_kind,
            requester_id,
            origin,
            destination,
            status: JobStatus::Requested,
            assigned_agent: None,
            assigned_at: None,
            cancel_reason: None,
            created_at: now,
            history: vec![StatusEntry {
                status: JobStatus::Requested,
                actor: Actor::Requester(requester_id),
                at: now,
            }],
        }
    }
}
