#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voicestudio::error::{Result, VoiceError};
use voicestudio::models::{Catalog, ModelFactory, ModelInfo, ModelRegistry, SpeechModel};

pub const ALPHA: ModelInfo = ModelInfo {
    id: "alpha",
    description: "Test model alpha",
    size_mb: 1,
    hf_repo: "test/alpha",
    hf_revision: "main",
    files: &[],
    default_lang: "a",
    default_voice: "voice_a",
    output_subdir: "alpha",
};

pub const BETA: ModelInfo = ModelInfo {
    id: "beta",
    description: "Test model beta",
    size_mb: 2,
    hf_repo: "test/beta",
    hf_revision: "main",
    files: &[],
    default_lang: "b",
    default_voice: "voice_b",
    output_subdir: "beta",
};

pub fn test_catalog() -> Catalog {
    Catalog::new(vec![ALPHA, BETA])
}

/// Counters shared between a [`FakeFactory`] and the test observing it
#[derive(Debug, Default)]
pub struct FakeStats {
    pub constructions: AtomicUsize,
    pub downloads: AtomicUsize,
    pub active_downloads: AtomicUsize,
    pub peak_downloads: AtomicUsize,
    pub syntheses: AtomicUsize,
    pub last_language: Mutex<Option<(String, Option<String>)>>,
}

impl FakeStats {
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

/// Builds [`FakeModel`]s with configurable latency and failures
#[derive(Debug, Default, Clone)]
pub struct FakeFactory {
    pub stats: Arc<FakeStats>,
    pub construct_delay: Duration,
    pub synth_delay: Duration,
    pub download_delay: Duration,
    pub fail_download: bool,
    pub fail_synthesis: bool,
}

impl FakeFactory {
    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::new(ModelRegistry::new(test_catalog(), self.clone()))
    }
}

impl ModelFactory for FakeFactory {
    fn create(&self, info: &ModelInfo) -> Result<Box<dyn SpeechModel>> {
        std::thread::sleep(self.construct_delay);
        self.stats.constructions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModel {
            factory: self.clone(),
            lang: info.default_lang.to_string(),
            voice: info.default_voice.to_string(),
        }))
    }
}

/// Writes a short silent WAV instead of real speech
#[derive(Debug)]
pub struct FakeModel {
    factory: FakeFactory,
    lang: String,
    voice: String,
}

impl SpeechModel for FakeModel {
    fn generate_audio(&mut self, text: &str, output: &Path) -> Result<PathBuf> {
        std::thread::sleep(self.factory.synth_delay);
        if self.factory.fail_synthesis {
            return Err(VoiceError::Synthesis(format!("cannot say '{text}'")));
        }

        write_silence(output)?;
        self.factory.stats.syntheses.fetch_add(1, Ordering::SeqCst);
        Ok(output.to_path_buf())
    }

    fn change_language(&mut self, lang_code: &str, voice: Option<&str>) -> Result<()> {
        self.lang = lang_code.to_string();
        if let Some(voice) = voice {
            self.voice = voice.to_string();
        }
        *self.factory.stats.last_language.lock() =
            Some((self.lang.clone(), voice.map(ToString::to_string)));
        Ok(())
    }

    fn download(&mut self) -> Result<()> {
        let stats = &self.factory.stats;
        let active = stats.active_downloads.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_downloads.fetch_max(active, Ordering::SeqCst);

        std::thread::sleep(self.factory.download_delay);

        stats.active_downloads.fetch_sub(1, Ordering::SeqCst);
        stats.downloads.fetch_add(1, Ordering::SeqCst);

        if self.factory.fail_download {
            return Err(VoiceError::Download("network unreachable".to_string()));
        }
        Ok(())
    }
}

fn write_silence(path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| VoiceError::Synthesis(format!("Failed to create WAV: {e}")))?;
    for _ in 0..240 {
        writer
            .write_sample(0i16)
            .map_err(|e| VoiceError::Synthesis(format!("Failed to write WAV: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoiceError::Synthesis(format!("Failed to finalize WAV: {e}")))
}
