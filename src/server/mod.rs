//! HTTP and WebSocket surface
//!
//! Translates requests into registry, dispatcher and orchestrator calls. Generated
//! audio is served from the output directory under `/output`.

pub mod error;
pub mod handlers;
pub mod ws;

pub use error::ApiError;

use crate::dispatch::{SpeechService, WorkDispatcher};
use crate::download::DownloadOrchestrator;
use crate::error::Result;
use crate::models::ModelRegistry;
use crate::store::StatusStore;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub dispatcher: Arc<WorkDispatcher>,
    pub store: Arc<dyn StatusStore>,
    pub speech: SpeechService,
    pub downloads: Arc<DownloadOrchestrator>,
}

impl AppState {
    /// Wire the services around one registry, dispatcher and store
    pub fn new(
        registry: Arc<ModelRegistry>,
        dispatcher: Arc<WorkDispatcher>,
        store: Arc<dyn StatusStore>,
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        let speech = SpeechService::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            output_dir,
            extension,
        );
        let downloads = Arc::new(DownloadOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
        ));

        Self {
            registry,
            dispatcher,
            store,
            speech,
            downloads,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let output_dir = state.speech.output_dir().to_path_buf();

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/tts", post(handlers::text_to_speech))
        .route("/change-language", post(handlers::change_language))
        .route(
            "/models/load",
            get(handlers::loaded_models).post(handlers::load_model),
        )
        .route("/models/unload", post(handlers::unload_model))
        .route("/models/download", get(handlers::download_states))
        .route("/models/catalog", get(handlers::catalog))
        .route("/ws/download-model", get(ws::download_model))
        .nest_service("/output", ServeDir::new(output_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::fs::create_dir_all(state.speech.output_dir()).await {
        tracing::warn!(
            "Could not create output dir {}: {e}",
            state.speech.output_dir().display()
        );
    }

    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
