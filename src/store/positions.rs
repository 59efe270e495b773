use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::position::PositionSample;

/// Latest-position store. Writes are fire-and-forget overwrites that never
/// touch job or agent locks; reads treat stale samples as absent.
#[derive(Default)]
pub struct PositionStore {
    samples: DashMap<Uuid, PositionSample>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self {
            samples: DashMap::new(),
        }
    }

    /// Last-write-wins by sample timestamp; an out-of-order older sample is
    /// dropped so retransmissions cannot roll position backwards.
    pub fn update(&self, agent_id: Uuid, sample: PositionSample) {
        match self.samples.get_mut(&agent_id) {
            Some(mut entry) => {
                if sample.recorded_at > entry.value().recorded_at {
                    *entry.value_mut() = sample;
                }
            }
            None => {
                self.samples.insert(agent_id, sample);
            }
        }
    }

    /// `None` means position unknown: never seen, or older than `staleness`.
    pub fn latest(&self, agent_id: Uuid, staleness: Duration) -> Option<PositionSample> {
        let entry = self.samples.get(&agent_id)?;
        let sample = *entry.value();

        let age = Utc::now().signed_duration_since(sample.recorded_at);
        if age.num_milliseconds() > staleness.as_millis() as i64 {
            return None;
        }

        Some(sample)
    }
}
