use crate::error::{Result, VoiceError};
use crate::models::catalog::ModelInfo;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Cache, Repo, RepoType};
use std::fs;
use std::path::{Path, PathBuf};

/// Location and size of a model's files after a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedModel {
    pub dir: PathBuf,
    pub size_bytes: u64,
}

/// Fetches model files from the `HuggingFace` Hub into the local hub cache
#[derive(Debug, Clone)]
pub struct ModelFetcher {
    cache: Cache,
}

impl ModelFetcher {
    /// Create a fetcher for `cache_dir`, or the default hub cache (`HF_HOME`) when `None`
    #[must_use]
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        let cache = cache_dir.map_or_else(Cache::from_env, Cache::new);
        Self { cache }
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    fn repo(info: &ModelInfo) -> Repo {
        Repo::with_revision(
            info.hf_repo.to_string(),
            RepoType::Model,
            info.hf_revision.to_string(),
        )
    }

    /// Snapshot directory if every file of the model is already cached
    #[must_use]
    pub fn cached_dir(&self, info: &ModelInfo) -> Option<PathBuf> {
        let repo = self.cache.repo(Self::repo(info));
        let mut dir = None;
        for file in info.files {
            let path = repo.get(file)?;
            if dir.is_none() {
                dir = snapshot_root(&path, file);
            }
        }
        dir
    }

    /// Download every file of the model. Files already cached are not re-fetched.
    pub fn fetch(&self, info: &ModelInfo) -> Result<FetchedModel> {
        fs::create_dir_all(self.cache_dir())?;
        self.check_disk_space(info.size_mb)?;

        tracing::info!("Downloading {} from HuggingFace ({})", info.id, info.hf_repo);

        let api = ApiBuilder::from_cache(self.cache.clone())
            .with_progress(false)
            .build()
            .map_err(|e| {
                VoiceError::Download(format!("Failed to initialize HuggingFace API: {e}"))
            })?;
        let repo = api.repo(Self::repo(info));

        let mut dir = None;
        let mut size_bytes = 0;
        for file in info.files {
            let path = repo
                .get(file)
                .map_err(|e| VoiceError::Download(format!("Failed to download {file}: {e}")))?;
            size_bytes += fs::metadata(&path).map_or(0, |m| m.len());
            if dir.is_none() {
                dir = snapshot_root(&path, file);
            }
            tracing::debug!("Fetched {file} for {}", info.id);
        }

        let dir = dir.unwrap_or_else(|| self.cache_dir().to_path_buf());
        tracing::info!("Downloaded {} ({})", info.id, format_bytes(size_bytes));

        Ok(FetchedModel { dir, size_bytes })
    }

    /// Check if enough disk space is available
    fn check_disk_space(&self, required_mb: u64) -> Result<()> {
        let stats = nix::sys::statvfs::statvfs(self.cache_dir())
            .map_err(|e| VoiceError::Other(format!("Failed to check disk space: {e}")))?;

        #[allow(clippy::useless_conversion)]
        let available_bytes = u64::from(stats.blocks_available()) * u64::from(stats.fragment_size());
        let required_bytes = required_mb * 1_024 * 1_024;

        // 100MB headroom
        let required_with_buffer = required_bytes + (100 * 1_024 * 1_024);

        if available_bytes < required_with_buffer {
            return Err(VoiceError::Download(format!(
                "Not enough disk space: {} required, {} available",
                format_bytes(required_with_buffer),
                format_bytes(available_bytes)
            )));
        }

        Ok(())
    }
}

/// Strip the repo-relative `file` from a cached `path`, leaving the snapshot dir
fn snapshot_root(path: &Path, file: &str) -> Option<PathBuf> {
    let depth = Path::new(file).components().count();
    let mut root = path;
    for _ in 0..depth {
        root = root.parent()?;
    }
    Some(root.to_path_buf())
}

/// Format bytes as human-readable string
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
