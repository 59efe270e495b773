use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::models::offer::Offer;
use crate::models::position::PositionSample;

/// Outbound events pushed to interested connections: the requester, the
/// offered/assigned agent, and observability consumers. Delivery mechanics
/// live with the subscribers (WebSocket handler, tests); the engine only
/// publishes snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DispatchEvent {
    OfferIssued {
        job_id: Uuid,
        agent_id: Uuid,
        offer: Offer,
    },
    JobStatusChanged {
        job_id: Uuid,
        status: JobStatus,
        job: Job,
    },
    PositionRefreshed {
        agent_id: Uuid,
        sample: PositionSample,
    },
}

#[derive(Clone)]
pub struct Fanout {
    events_tx: broadcast::Sender<DispatchEvent>,
}

impl Fanout {
    pub fn new(buffer: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(buffer);
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events_tx.subscribe()
    }

    pub fn offer_issued(&self, offer: &Offer) {
        let _ = self.events_tx.send(DispatchEvent::OfferIssued {
            job_id: offer.job_id,
            agent_id: offer.agent_id,
            offer: offer.clone(),
        });
    }

    pub fn job_status_changed(&self, job: &Job) {
        let _ = self.events_tx.send(DispatchEvent::JobStatusChanged {
            job_id: job.id,
            status: job.status,
            job: job.clone(),
        });
    }

    pub fn position_refreshed(&self, agent_id: Uuid, sample: &PositionSample) {
        let _ = self.events_tx.send(DispatchEvent::PositionRefreshed {
            agent_id,
            sample: *sample,
        });
    }
}
