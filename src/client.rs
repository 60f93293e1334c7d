use crate::config::schema::ServerConfig;
use crate::dispatch::SynthesisOutput;
use crate::error::{Result, VoiceError};
use crate::server::handlers::{
    CatalogEntry, HealthResponse, LanguageRequest, MessageResponse, ModelRequest, ServiceInfo,
    StatusResponse, TtsRequest,
};
use crate::store::ModelState;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Synthesis can take minutes on CPU
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP client for a running voicestudio server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create client for the server at `base_url`, e.g. `http://127.0.0.1:8000`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Client for the server described by `config`
    ///
    /// A wildcard bind address is reached through loopback.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let host = match config.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            host => host,
        };
        Self::new(format!("http://{host}:{}", config.port))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn info(&self) -> Result<ServiceInfo> {
        self.send(self.client.get(self.url("/")), None).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.client.get(self.url("/health")), None).await
    }

    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        self.send(self.client.get(self.url("/models/catalog")), None)
            .await
    }

    pub async fn loaded_models(&self) -> Result<Vec<String>> {
        self.send(self.client.get(self.url("/models/load")), None)
            .await
    }

    pub async fn load_model(&self, model_id: &str) -> Result<StatusResponse> {
        let body = ModelRequest {
            model_id: model_id.to_string(),
        };
        self.send(
            self.client.post(self.url("/models/load")).json(&body),
            Some(model_id),
        )
        .await
    }

    pub async fn unload_model(&self, model_id: &str) -> Result<StatusResponse> {
        let body = ModelRequest {
            model_id: model_id.to_string(),
        };
        self.send(
            self.client.post(self.url("/models/unload")).json(&body),
            Some(model_id),
        )
        .await
    }

    pub async fn synthesize(&self, model_id: &str, text: &str) -> Result<SynthesisOutput> {
        let body = TtsRequest {
            text: text.to_string(),
            model_id: model_id.to_string(),
        };
        self.send(self.client.post(self.url("/tts")).json(&body), Some(model_id))
            .await
    }

    pub async fn change_language(
        &self,
        model_id: &str,
        lang_code: &str,
        voice: Option<&str>,
    ) -> Result<MessageResponse> {
        let body = LanguageRequest {
            model_id: model_id.to_string(),
            lang_code: lang_code.to_string(),
            voice: voice.map(ToString::to_string),
        };
        self.send(
            self.client.post(self.url("/change-language")).json(&body),
            Some(model_id),
        )
        .await
    }

    /// Recorded download states, optionally only for `model_ids`
    pub async fn download_states(&self, model_ids: Option<&[String]>) -> Result<Vec<ModelState>> {
        let mut request = self.client.get(self.url("/models/download"));
        if let Some(ids) = model_ids {
            request = request.query(&[("model_ids", ids.join(","))]);
        }
        self.send(request, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        model_id: Option<&str>,
    ) -> Result<T> {
        let response = request
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                VoiceError::Other(format!(
                    "Could not connect to server at {}. Is it running? Error: {e}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| VoiceError::Other(format!("Invalid response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_response(status, &body, model_id))
    }
}

/// Turn an error response back into the matching error kind
fn error_from_response(status: StatusCode, body: &str, model_id: Option<&str>) -> VoiceError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| body.to_string());

    match (status, model_id) {
        (StatusCode::NOT_FOUND, Some(id)) => VoiceError::UnknownModel {
            id: id.to_string(),
            suggestion: None,
        },
        (StatusCode::BAD_REQUEST, _) => VoiceError::InvalidRequest(message),
        _ => VoiceError::Other(format!("API error ({status}): {message}")),
    }
}
