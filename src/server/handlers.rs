//! HTTP endpoints

use crate::dispatch::SynthesisOutput;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::store::ModelState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
    pub status: String,
}

pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Voice Studio Models".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "online".to_string(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub loaded_models: Vec<String>,
    pub workers: usize,
    pub busy: usize,
    pub queued: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.dispatcher.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        loaded_models: state.registry.list_loaded(),
        workers: stats.workers,
        busy: stats.busy,
        queued: stats.queued,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub model_id: String,
}

pub async fn text_to_speech(
    State(state): State<AppState>,
    body: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Json<SynthesisOutput>, ApiError> {
    let Json(request) = body?;
    let output = state
        .speech
        .synthesize(&request.model_id, &request.text)
        .await?;
    Ok(Json(output))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageRequest {
    pub model_id: String,
    pub lang_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn change_language(
    State(state): State<AppState>,
    body: Result<Json<LanguageRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    state
        .speech
        .change_language(&request.model_id, &request.lang_code, request.voice.as_deref())
        .await?;

    Ok(Json(MessageResponse {
        message: "Language changed successfully".to_string(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Instantiate a model ahead of its first synthesis
pub async fn load_model(
    State(state): State<AppState>,
    body: Result<Json<ModelRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = body?;
    state.registry.catalog().require(&request.model_id)?;

    let registry = state.registry.clone();
    let model_id = request.model_id.clone();
    state
        .dispatcher
        .run(move || registry.load(&model_id).map(drop))
        .await?;

    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: format!("Model {} loaded successfully", request.model_id),
    }))
}

/// Drop a loaded model; succeeds whether or not it was loaded
pub async fn unload_model(
    State(state): State<AppState>,
    body: Result<Json<ModelRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = body?;
    state.registry.unload(&request.model_id);

    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: format!("Model {} unloaded successfully", request.model_id),
    }))
}

pub async fn loaded_models(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut ids = state.registry.list_loaded();
    ids.sort();
    Json(ids)
}

#[derive(Debug, Default, Deserialize)]
pub struct StatesQuery {
    /// Comma separated identifiers
    pub model_ids: Option<String>,
}

impl StatesQuery {
    fn ids(&self) -> Option<Vec<String>> {
        self.model_ids.as_ref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect()
        })
    }
}

pub async fn download_states(
    State(state): State<AppState>,
    query: Result<Query<StatesQuery>, QueryRejection>,
) -> Result<Json<Vec<ModelState>>, ApiError> {
    let Query(query) = query?;
    let ids = query.ids();
    let states = state.store.list(ids.as_deref()).await?;
    Ok(Json(states))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub model_id: String,
    pub description: String,
    pub size_mb: u64,
    pub default_lang: String,
    pub default_voice: String,
}

pub async fn catalog(State(state): State<AppState>) -> Json<Vec<CatalogEntry>> {
    let entries = state
        .registry
        .catalog()
        .iter()
        .map(|info| CatalogEntry {
            model_id: info.id.to_string(),
            description: info.description.to_string(),
            size_mb: info.size_mb,
            default_lang: info.default_lang.to_string(),
            default_voice: info.default_voice.to_string(),
        })
        .collect();
    Json(entries)
}
