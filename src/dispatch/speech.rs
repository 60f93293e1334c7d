use crate::dispatch::WorkDispatcher;
use crate::error::{Result, VoiceError};
use crate::models::ModelRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one synthesis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub filename: String,
}

/// Synthesis and configuration calls, executed on the work dispatcher
#[derive(Debug, Clone)]
pub struct SpeechService {
    registry: Arc<ModelRegistry>,
    dispatcher: Arc<WorkDispatcher>,
    output_dir: PathBuf,
    extension: String,
}

impl SpeechService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        dispatcher: Arc<WorkDispatcher>,
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            output_dir: output_dir.into(),
            extension: extension.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Convert `text` with model `model_id`, returning the written file
    pub async fn synthesize(&self, model_id: &str, text: &str) -> Result<SynthesisOutput> {
        let info = self.registry.catalog().require(model_id)?;
        if text.trim().is_empty() {
            return Err(VoiceError::InvalidRequest("text must not be empty".to_string()));
        }

        let path = self
            .output_dir
            .join(info.output_subdir)
            .join(unique_filename(model_id, &self.extension));

        let registry = Arc::clone(&self.registry);
        let model_id = model_id.to_string();
        let text = text.to_string();

        let written = self
            .dispatcher
            .run(move || {
                let handle = registry.load(&model_id)?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                handle.generate_audio(&text, &path).map_err(|e| match e {
                    VoiceError::Synthesis(_) => e,
                    other => VoiceError::Synthesis(other.to_string()),
                })
            })
            .await?;

        tracing::info!("Audio file: {}", written.display());
        Ok(SynthesisOutput {
            filename: written.display().to_string(),
        })
    }

    /// Change language and optionally voice of model `model_id`, loading it if needed
    pub async fn change_language(
        &self,
        model_id: &str,
        lang_code: &str,
        voice: Option<&str>,
    ) -> Result<()> {
        self.registry.catalog().require(model_id)?;

        let registry = Arc::clone(&self.registry);
        let model_id = model_id.to_string();
        let lang_code = lang_code.to_string();
        let voice = voice.map(ToString::to_string);

        self.dispatcher
            .run(move || {
                registry
                    .load(&model_id)?
                    .change_language(&lang_code, voice.as_deref())
            })
            .await
    }
}

/// `<model_id>_<random>.<ext>`, unique per call
fn unique_filename(model_id: &str, extension: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{model_id}_{}.{extension}", &suffix[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_filename() {
        let a = unique_filename("kokoro-82M", "wav");
        let b = unique_filename("kokoro-82M", "wav");

        assert!(a.starts_with("kokoro-82M_"));
        assert!(a.ends_with(".wav"));
        assert_eq!(a.len(), "kokoro-82M_".len() + 12 + ".wav".len());
        assert_ne!(a, b);
    }
}
