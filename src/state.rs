use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::fanout::Fanout;
use crate::observability::metrics::Metrics;
use crate::store::agents::AgentDirectory;
use crate::store::jobs::JobRegistry;
use crate::store::offers::OfferBoard;
use crate::store::positions::PositionStore;

pub struct AppState {
    pub jobs: JobRegistry,
    pub agents: AgentDirectory,
    pub positions: PositionStore,
    pub offers: OfferBoard,
    pub job_tx: mpsc::Sender<Uuid>,
    pub fanout: Fanout,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> (Self, mpsc::Receiver<Uuid>) {
        let (job_tx, job_rx) = mpsc::channel(config.job_queue_size);
        let fanout = Fanout::new(config.event_buffer_size);

        (
            Self {
                jobs: JobRegistry::new(),
                agents: AgentDirectory::new(),
                positions: PositionStore::new(),
                offers: OfferBoard::new(),
                job_tx,
                fanout,
                metrics: Metrics::new(),
                config,
            },
            job_rx,
        )
    }
}
