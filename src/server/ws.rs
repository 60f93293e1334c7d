//! WebSocket channel driving a model download

use crate::download::{DownloadEvent, DownloadOrchestrator};
use crate::error::VoiceError;
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use std::sync::Arc;

/// First and only message a client sends
#[derive(Debug, Deserialize)]
struct DownloadRequest {
    #[serde(default)]
    model_id: Option<String>,
}

pub async fn download_model(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let downloads = Arc::clone(&state.downloads);
    ws.on_failed_upgrade(|e: axum::Error| {
        tracing::error!("{}", VoiceError::ChannelSetup(e.to_string()));
    })
    .on_upgrade(move |socket| {
        let (sender, receiver) = socket.split();
        relay(sender, receiver, downloads)
    })
}

/// Read the download request from `receiver` and push its events to `sender`
///
/// Returns once the final event has been sent and the channel closed, or as soon
/// as the client goes away. The download itself is never cancelled here.
async fn relay<S, R>(mut sender: S, mut receiver: R, downloads: Arc<DownloadOrchestrator>)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let request = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str::<DownloadRequest>(&text),
            Some(Ok(Message::Binary(bytes))) => {
                break serde_json::from_slice::<DownloadRequest>(&bytes)
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!("Client closed the channel before requesting a download");
                return;
            }
            Some(Err(e)) => {
                tracing::warn!("Failed to read download request: {e}");
                return;
            }
        }
    };

    let request = match request {
        Ok(request) => request,
        Err(e) => {
            let event = DownloadEvent::error(format!("Unexpected error: {e}"), None);
            send_event(&mut sender, &event).await.ok();
            sender.send(Message::Close(None)).await.ok();
            return;
        }
    };

    let model_id = request.model_id.clone().unwrap_or_default();
    let mut session = downloads.start(request.model_id);

    while let Some(event) = session.events.recv().await {
        if let Err(e) = send_event(&mut sender, &event).await {
            // The download itself keeps going on its own task
            tracing::info!("Client disconnected during download of model {model_id}: {e}");
            return;
        }
    }

    sender.send(Message::Close(None)).await.ok();
}

async fn send_event<S>(sender: &mut S, event: &DownloadEvent) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = serde_json::to_string(event).map_err(|e| e.to_string())?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::{Catalog, ModelInfo, ModelRegistry, SpeechModel};
    use crate::store::{DownloadStatus, JsonStatusStore, StatusStore};
    use futures_util::{sink, stream};
    use serde_json::Value;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::TempDir;

    type Gate = Arc<parking_lot::Mutex<mpsc::Receiver<()>>>;
    type Incoming = stream::Iter<std::vec::IntoIter<std::result::Result<Message, axum::Error>>>;

    /// Downloads instantly, or once the gate is opened
    struct Gated {
        gate: Option<Gate>,
    }

    impl SpeechModel for Gated {
        fn generate_audio(&mut self, _text: &str, output: &Path) -> Result<PathBuf> {
            Ok(output.to_path_buf())
        }
        fn change_language(&mut self, _lang_code: &str, _voice: Option<&str>) -> Result<()> {
            Ok(())
        }
        fn download(&mut self) -> Result<()> {
            if let Some(gate) = &self.gate {
                gate.lock().recv().ok();
            }
            Ok(())
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        store: Arc<dyn StatusStore>,
        downloads: Arc<DownloadOrchestrator>,
    }

    fn fixture(gate: Option<Gate>) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn StatusStore> =
            Arc::new(JsonStatusStore::open(temp_dir.path().join("state.json")).unwrap());
        let catalog = Catalog::new(vec![ModelInfo {
            id: "alpha",
            description: "test",
            size_mb: 1,
            hf_repo: "test/alpha",
            hf_revision: "main",
            files: &[],
            default_lang: "a",
            default_voice: "v",
            output_subdir: "alpha",
        }]);
        let registry = Arc::new(ModelRegistry::new(
            catalog,
            move |_: &ModelInfo| -> Result<Box<dyn SpeechModel>> {
                Ok(Box::new(Gated { gate: gate.clone() }))
            },
        ));

        Fixture {
            _temp_dir: temp_dir,
            downloads: Arc::new(DownloadOrchestrator::new(registry, Arc::clone(&store))),
            store,
        }
    }

    fn request(text: &str) -> Incoming {
        stream::iter(vec![Ok(Message::Text(text.to_string()))])
    }

    fn json(message: &Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("Expected text frame, got {other:?}"),
        }
    }

    async fn wait_for(store: &Arc<dyn StatusStore>, status: DownloadStatus) {
        for _ in 0..200 {
            if store.get("alpha").await.unwrap() == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("alpha never reached {status}");
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_then_close() {
        let fx = fixture(None);
        let mut sent: Vec<Message> = Vec::new();

        relay(&mut sent, request("not json"), Arc::clone(&fx.downloads)).await;

        assert_eq!(sent.len(), 2);
        let event = json(&sent[0]);
        assert_eq!(event["status"], "error");
        assert!(event["error"]
            .as_str()
            .unwrap()
            .starts_with("Unexpected error: "));
        assert!(event.get("model_id").is_none());
        assert_eq!(sent[1], Message::Close(None));
        assert!(fx.store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_relayed_in_order_then_closed() {
        let fx = fixture(None);
        let mut sent: Vec<Message> = Vec::new();

        relay(
            &mut sent,
            request(r#"{"model_id": "alpha"}"#),
            Arc::clone(&fx.downloads),
        )
        .await;

        assert_eq!(sent.len(), 3);
        assert_eq!(json(&sent[0]), serde_json::json!({"status": 0, "model_id": "alpha"}));
        assert_eq!(json(&sent[1]), serde_json::json!({"status": 1, "model_id": "alpha"}));
        assert_eq!(sent[2], Message::Close(None));
        assert_eq!(fx.store.get("alpha").await.unwrap(), Some(DownloadStatus::Ready));
    }

    #[tokio::test]
    async fn test_missing_model_id_reports_error() {
        let fx = fixture(None);
        let mut sent: Vec<Message> = Vec::new();

        relay(&mut sent, request("{}"), Arc::clone(&fx.downloads)).await;

        assert_eq!(sent.len(), 2);
        assert_eq!(
            json(&sent[0]),
            serde_json::json!({"status": "error", "error": "model_id is required"})
        );
        assert_eq!(sent[1], Message::Close(None));
    }

    #[tokio::test]
    async fn test_client_gone_before_request() {
        let fx = fixture(None);
        let mut sent: Vec<Message> = Vec::new();

        relay(
            &mut sent,
            stream::iter(Vec::<std::result::Result<Message, axum::Error>>::new()),
            Arc::clone(&fx.downloads),
        )
        .await;

        assert!(sent.is_empty());
        assert!(fx.store.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_leaves_download_running() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let fx = fixture(Some(Arc::new(parking_lot::Mutex::new(release_rx))));

        // Every send fails, as if the client hung up right after asking
        let gone = Box::pin(sink::unfold((), |(), _: Message| async {
            Err::<(), _>(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }));

        tokio::time::timeout(
            Duration::from_secs(5),
            relay(gone, request(r#"{"model_id": "alpha"}"#), Arc::clone(&fx.downloads)),
        )
        .await
        .expect("relay waited for the download to finish");

        wait_for(&fx.store, DownloadStatus::Downloading).await;
        release_tx.send(()).unwrap();
        wait_for(&fx.store, DownloadStatus::Ready).await;
    }
}
