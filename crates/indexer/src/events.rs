use serde::Serialize;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of each subscriber's queue; a subscriber that falls this far
/// behind starts losing events rather than blocking the emitter.
const SUBSCRIBER_QUEUE: usize = 256;

/// Per-file metrics attached to [`IndexingEvent::Metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetrics {
    pub file_size: u64,
    pub chunk_count: usize,
    pub processing_time_ms: u64,
    pub memory_delta_bytes: i64,
}

/// Lifecycle and telemetry events published by the coordinator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum IndexingEvent {
    IndexingStarted {
        project_id: String,
    },
    IndexingProgress {
        project_id: String,
        percent: u8,
    },
    IndexingCompleted {
        project_id: String,
    },
    IndexingError {
        project_id: String,
        message: String,
    },
    IndexingMetrics {
        project_id: String,
        rel_path: String,
        metrics: FileMetrics,
    },
    MemoryWarning {
        project_id: String,
        used_percent: f64,
        threshold_percent: f64,
    },
}

impl IndexingEvent {
    /// The project this event concerns.
    #[must_use]
    pub fn project_id(&self) -> &str {
        match self {
            IndexingEvent::IndexingStarted { project_id }
            | IndexingEvent::IndexingProgress { project_id, .. }
            | IndexingEvent::IndexingCompleted { project_id }
            | IndexingEvent::IndexingError { project_id, .. }
            | IndexingEvent::IndexingMetrics { project_id, .. }
            | IndexingEvent::MemoryWarning { project_id, .. } => project_id,
        }
    }
}

/// In-process typed publish/subscribe.
///
/// Emission is fire-and-forget: each subscriber has its own bounded queue
/// drained on its own task, so one slow or failing subscriber can neither
/// block the emitter nor starve the others.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<IndexingEvent>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw subscription: the caller drains the receiver itself.
    pub fn subscribe(&self) -> mpsc::Receiver<IndexingEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.subscribers.lock().expect("subscriber lock").push(tx);
        rx
    }

    /// Spawn a handler task fed by its own subscription. Handler errors are
    /// logged and swallowed; they never reach the emitter.
    pub fn subscribe_with<F, Fut>(&self, name: &str, handler: F) -> JoinHandle<()>
    where
        F: Fn(IndexingEvent) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut rx = self.subscribe();
        let name = name.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = handler(event).await {
                    log::warn!("event subscriber {name} failed: {e}");
                }
            }
        })
    }

    /// Publish to every live subscriber. Closed subscribers are pruned;
    /// full queues drop the event for that subscriber with a warning.
    pub fn emit(&self, event: IndexingEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber lock");
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!(
                    "event subscriber queue full; dropping event for project {}",
                    event.project_id()
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber lock").len()
    }
}
