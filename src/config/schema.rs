use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Generated audio lands here and is served under `/output`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: String,
    /// `HuggingFace` hub cache. Uses `HF_HOME` when unset.
    pub hf_cache: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Worker slots for blocking synthesis. Defaults to half the CPUs, at least 2.
    pub threads: Option<usize>,
    /// Reject submissions with `Overloaded` once this many are waiting. Unbounded when unset.
    pub max_queue: Option<usize>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SynthesizerConfig {
    /// External synthesizer executable. Text is written to its stdin.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments; `{output}`, `{voice}`, `{lang}` and `{model_dir}` are substituted
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Extension of generated audio files
    #[serde(default = "default_extension")]
    pub extension: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
const fn default_port() -> u16 {
    8000
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_status_file() -> String {
    "model_state.json".to_string()
}
fn default_program() -> String {
    "kokoro-tts".to_string()
}
fn default_args() -> Vec<String> {
    ["-", "{output}", "--voice", "{voice}", "--lang", "{lang}"]
        .iter()
        .map(ToString::to_string)
        .collect()
}
fn default_extension() -> String {
    "wav".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            status_file: default_status_file(),
            hf_cache: None,
        }
    }
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            extension: default_extension(),
        }
    }
}

impl StorageConfig {
    /// Full path of the download status file
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(&self.status_file)
    }
}

impl WorkerConfig {
    /// Number of worker slots to start
    #[must_use]
    pub fn resolved_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| (num_cpus::get() / 2).max(2))
    }
}

impl Config {
    /// Reject values the server can't run with
    pub fn validate(&self) -> Result<()> {
        if self.workers.threads == Some(0) {
            return Err(VoiceError::Config(
                "workers.threads must be at least 1".to_string(),
            ));
        }
        if self.synthesizer.program.trim().is_empty() {
            return Err(VoiceError::Config(
                "synthesizer.program must not be empty".to_string(),
            ));
        }
        if self.synthesizer.extension.trim().is_empty()
            || self.synthesizer.extension.contains(['/', '.'])
        {
            return Err(VoiceError::Config(format!(
                "synthesizer.extension '{}' is not a valid file extension",
                self.synthesizer.extension
            )));
        }
        if self.storage.status_file.trim().is_empty() {
            return Err(VoiceError::Config(
                "storage.status_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
