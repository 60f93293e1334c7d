//! Download state machine
//!
//! A download moves a model from no record / `PENDING` to `DOWNLOADING` and then to
//! `READY`, or back to `PENDING` on failure. Each transition is persisted before
//! the matching event is pushed to the listener. The handle used for the
//! download is unloaded afterwards either way.

pub mod events;

pub use events::{DownloadEvent, ErrorTag};

use crate::error::{Result, VoiceError};
use crate::models::ModelRegistry;
use crate::store::{DownloadStatus, StatusStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Events a single download can produce, so sends never wait on the listener
const EVENT_BUFFER: usize = 8;

/// A download running in the background
#[derive(Debug)]
pub struct DownloadSession {
    /// Status events. Dropping this does not stop the download.
    pub events: mpsc::Receiver<DownloadEvent>,
    /// Resolves with the final status once the download has finished
    pub task: JoinHandle<Result<DownloadStatus>>,
}

/// Drives models through download and records their status
pub struct DownloadOrchestrator {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn StatusStore>,
    // One entry per catalog id at most
    locks: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DownloadOrchestrator {
    pub fn new(registry: Arc<ModelRegistry>, store: Arc<dyn StatusStore>) -> Self {
        Self {
            registry,
            store,
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Start a download on a detached task
    ///
    /// The download runs to completion and persists its outcome even if the
    /// returned session is dropped.
    pub fn start(self: &Arc<Self>, model_id: Option<String>) -> DownloadSession {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let this = Arc::clone(self);

        let task = tokio::spawn(async move { this.download(model_id.as_deref(), &tx).await });

        DownloadSession { events, task }
    }

    /// Download `model_id`, reporting progress on `events`
    ///
    /// Returns the final recorded status. Every failure is also sent as an
    /// error event; a closed `events` channel is ignored.
    pub async fn download(
        &self,
        model_id: Option<&str>,
        events: &mpsc::Sender<DownloadEvent>,
    ) -> Result<DownloadStatus> {
        let Some(model_id) = model_id.map(str::trim).filter(|id| !id.is_empty()) else {
            emit(events, DownloadEvent::error("model_id is required", None)).await;
            return Err(VoiceError::InvalidRequest("model_id is required".to_string()));
        };

        if let Err(e) = self.registry.catalog().require(model_id) {
            emit(events, DownloadEvent::error(e.to_string(), Some(model_id))).await;
            return Err(e);
        }

        let lock = self.lock_for(model_id);
        let _guard = lock.lock().await;

        tracing::info!("Downloading model {model_id}");
        emit(events, DownloadEvent::status(DownloadStatus::Downloading, model_id)).await;

        if let Err(e) = self.store.put(model_id, DownloadStatus::Downloading).await {
            emit(events, DownloadEvent::error(e.to_string(), Some(model_id))).await;
            return Err(e);
        }

        let result = match self.fetch(model_id).await {
            Ok(()) => match self.store.put(model_id, DownloadStatus::Ready).await {
                Ok(()) => {
                    tracing::info!("Model {model_id} completed");
                    emit(events, DownloadEvent::status(DownloadStatus::Ready, model_id)).await;
                    Ok(DownloadStatus::Ready)
                }
                Err(e) => {
                    self.rollback(model_id).await;
                    emit(events, DownloadEvent::error(e.to_string(), Some(model_id))).await;
                    Err(e)
                }
            },
            Err(e) => {
                tracing::warn!("Download of {model_id} failed: {e}");
                self.rollback(model_id).await;
                emit(events, DownloadEvent::error(e.to_string(), Some(model_id))).await;
                Err(e)
            }
        };

        self.registry.unload(model_id);
        result
    }

    /// Load the model and run its download on a blocking thread
    async fn fetch(&self, model_id: &str) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let id = model_id.to_string();

        tokio::task::spawn_blocking(move || registry.load(&id)?.download())
            .await
            .map_err(|e| VoiceError::Download(format!("download task failed: {e}")))?
            .map_err(|e| match e {
                VoiceError::Download(_) => e,
                other => VoiceError::Download(other.to_string()),
            })
    }

    async fn rollback(&self, model_id: &str) {
        if let Err(e) = self.store.put(model_id, DownloadStatus::Pending).await {
            tracing::error!("Failed to reset {model_id} to PENDING: {e}");
        }
    }

    fn lock_for(&self, model_id: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.locks.lock().entry(model_id.to_string()).or_default())
    }
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

async fn emit(events: &mpsc::Sender<DownloadEvent>, event: DownloadEvent) {
    if events.send(event).await.is_err() {
        tracing::debug!("Download listener is gone, dropping event");
    }
}
