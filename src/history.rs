//! Background persistence queue.
//!
//! Handlers hand finished chat turns and pest detections to a bounded
//! queue; one worker task writes them to the store. Delivery is
//! at-most-once: a full queue or a failed write drops the job with a log line.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{NewChatTurn, NewPestDetection};
use crate::store::FarmStore;

#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    ChatTurn(NewChatTurn),
    PestDetection(NewPestDetection),
}

impl PersistJob {
    fn kind(&self) -> &'static str {
        match self {
            PersistJob::ChatTurn(_) => "chat_turn",
            PersistJob::PestDetection(_) => "pest_detection",
        }
    }

    fn farmer_id(&self) -> &str {
        match self {
            PersistJob::ChatTurn(turn) => &turn.farmer_id,
            PersistJob::PestDetection(detection) => &detection.farmer_id,
        }
    }
}

#[derive(Clone)]
pub struct HistoryQueue {
    tx: mpsc::Sender<PersistJob>,
}

impl HistoryQueue {
    /// Creates the queue and its receiving end for [`spawn_worker`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PersistJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never waits. Returns whether the job was accepted.
    pub fn enqueue(&self, job: PersistJob) -> bool {
        let kind = job.kind();
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!(job = kind, "Queued persistence job");
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = kind, farmer_id = %job.farmer_id(), "Persistence queue full; dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(job = kind, farmer_id = %job.farmer_id(), "Persistence worker stopped; dropping job");
                false
            }
        }
    }
}

/// Drains the queue until every [`HistoryQueue`] handle is dropped.
pub fn spawn_worker(store: Arc<dyn FarmStore>, mut rx: mpsc::Receiver<PersistJob>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Persistence worker started");
        while let Some(job) = rx.recv().await {
            persist(store.as_ref(), job).await;
        }
        info!("Persistence worker stopped");
    })
}

async fn persist(store: &dyn FarmStore, job: PersistJob) {
    let kind = job.kind();
    let farmer_id = job.farmer_id().to_string();
    let result = match &job {
        PersistJob::ChatTurn(turn) => store.insert_chat_turn(turn).await.map(|row| row.id),
        PersistJob::PestDetection(detection) => {
            store.insert_pest_detection(detection).await.map(|row| row.id)
        }
    };
    match result {
        Ok(id) => info!(job = kind, farmer_id = %farmer_id, id = %id, "Persisted"),
        Err(e) => warn!(job = kind, farmer_id = %farmer_id, error = %e, "Failed to persist job"),
    }
}
