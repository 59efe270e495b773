use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known location for an agent. Older samples are discarded on write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionSample {
    pub lat: f64,
    pub lng: f64,
    /// Degrees clockwise from north.
    pub heading: f64,
    /// Metres per second.
    pub speed: f64,
    pub recorded_at: DateTime<Utc>,
}
