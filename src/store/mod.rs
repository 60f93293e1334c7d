//! Durable download status per model identifier
//!
//! Status codes match the persisted encoding: `-1` pending, `0` downloading, `1` ready.
//! An identifier with no record has never been attempted.

pub mod file;

pub use file::JsonStatusStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Download state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Ready,
}

impl DownloadStatus {
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Pending => -1,
            Self::Downloading => 0,
            Self::Ready => 1,
        }
    }

    #[must_use]
    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(Self::Pending),
            0 => Some(Self::Downloading),
            1 => Some(Self::Ready),
            _ => None,
        }
    }
}

impl From<DownloadStatus> for i8 {
    fn from(status: DownloadStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i8> for DownloadStatus {
    type Error = String;

    fn try_from(code: i8) -> std::result::Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("invalid download status code {code}"))
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Ready => "READY",
        };
        f.write_str(name)
    }
}

/// One row of the status store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelState {
    pub model_id: String,
    pub download_status: DownloadStatus,
    pub modified_time: String,
}

/// Persistence seam for download status
///
/// `put` is an upsert and must be atomic per identifier.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, model_id: &str) -> Result<Option<DownloadStatus>>;

    async fn put(&self, model_id: &str, status: DownloadStatus) -> Result<()>;

    /// Recorded states, restricted to `model_ids` when given. Unrecorded ids are omitted.
    async fn list(&self, model_ids: Option<&[String]>) -> Result<Vec<ModelState>>;
}
