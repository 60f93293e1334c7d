use crate::store::DownloadStatus;
use serde::Serialize;

/// Marker serialized as the string `"error"` in place of a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorTag {
    #[serde(rename = "error")]
    Error,
}

/// Message pushed to the client driving a download
///
/// Serialized as `{"status": 0, "model_id": ...}` for progress and
/// `{"status": "error", "error": ..., "model_id": ...}` for failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DownloadEvent {
    Status {
        status: DownloadStatus,
        model_id: String,
    },
    Error {
        status: ErrorTag,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model_id: Option<String>,
    },
}

impl DownloadEvent {
    #[must_use]
    pub fn status(status: DownloadStatus, model_id: &str) -> Self {
        Self::Status {
            status,
            model_id: model_id.to_string(),
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>, model_id: Option<&str>) -> Self {
        Self::Error {
            status: ErrorTag::Error,
            error: error.into(),
            model_id: model_id.map(ToString::to_string),
        }
    }
}
