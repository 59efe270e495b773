use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::ServiceKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Availability record for one service-providing agent.
///
/// `current_job` is set and cleared only by the offer coordinator and the
/// lifecycle machine; an agent with a job is never eligible for new offers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: Uuid,
    pub name: String,
    pub online: bool,
    pub capabilities: Vec<ServiceKind>,
    pub rating: f64,
    pub current_job: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn accepts(&self, kind: ServiceKind) -> bool {
        self.capabilities.contains(&kind)
    }
}
