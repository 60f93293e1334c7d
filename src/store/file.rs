use crate::error::{Result, VoiceError};
use crate::store::{DownloadStatus, ModelState, StatusStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StatusRecord {
    status: DownloadStatus,
    modified_time: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StatusFile {
    models: BTreeMap<String, StatusRecord>,
}

/// Status store persisted as one JSON file, rewritten atomically on every change
#[derive(Debug)]
pub struct JsonStatusStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, StatusRecord>>,
}

impl JsonStatusStore {
    /// Open the store at `path`, creating it on first write
    ///
    /// Entries left at `DOWNLOADING` by a previous process are reset to `PENDING`:
    /// no download can be running in a process that just started.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut file = Self::read(&path)?;

        let stale: Vec<String> = file
            .models
            .iter()
            .filter(|(_, record)| record.status == DownloadStatus::Downloading)
            .map(|(id, _)| id.clone())
            .collect();

        if !stale.is_empty() {
            for id in &stale {
                tracing::warn!("Download of {id} was interrupted, resetting to PENDING");
                file.models.insert(id.clone(), record(DownloadStatus::Pending));
            }
            write_atomic(&path, &file)?;
        }

        tracing::debug!(
            "Opened status store at {} ({} entries)",
            path.display(),
            file.models.len()
        );

        Ok(Self {
            path,
            records: Mutex::new(file.models),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<StatusFile> {
        if !path.exists() {
            return Ok(StatusFile::default());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            VoiceError::Store(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    async fn persist(&self, models: &BTreeMap<String, StatusRecord>) -> Result<()> {
        let content = serde_json::to_string_pretty(&StatusFileRef { models })
            .map_err(|e| VoiceError::Store(format!("Failed to serialize status: {e}")))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusFileRef<'a> {
    models: &'a BTreeMap<String, StatusRecord>,
}

fn record(status: DownloadStatus) -> StatusRecord {
    StatusRecord {
        status,
        modified_time: chrono::Utc::now().to_rfc3339(),
    }
}

/// Write to a temporary file, then rename over `path`
fn write_atomic(path: &Path, file: &StatusFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let content = serde_json::to_string_pretty(file)
        .map_err(|e| VoiceError::Store(format!("Failed to serialize status: {e}")))?;

    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl StatusStore for JsonStatusStore {
    async fn get(&self, model_id: &str) -> Result<Option<DownloadStatus>> {
        Ok(self.records.lock().await.get(model_id).map(|r| r.status))
    }

    async fn put(&self, model_id: &str, status: DownloadStatus) -> Result<()> {
        let mut records = self.records.lock().await;
        let previous = records.insert(model_id.to_string(), record(status));

        if let Err(e) = self.persist(&records).await {
            // Keep memory and disk in agreement
            match previous {
                Some(previous) => records.insert(model_id.to_string(), previous),
                None => records.remove(model_id),
            };
            return Err(VoiceError::Store(format!(
                "Failed to record {status} for {model_id}: {e}"
            )));
        }

        tracing::debug!("Recorded {model_id} as {status}");
        Ok(())
    }

    async fn list(&self, model_ids: Option<&[String]>) -> Result<Vec<ModelState>> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(id, _)| model_ids.map_or(true, |wanted| wanted.contains(*id)))
            .map(|(id, record)| ModelState {
                model_id: id.clone(),
                download_status: record.status,
                modified_time: record.modified_time.clone(),
            })
            .collect())
    }
}
