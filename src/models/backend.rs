use crate::config::schema::SynthesizerConfig;
use crate::error::{Result, VoiceError};
use crate::models::catalog::ModelInfo;
use crate::models::fetch::ModelFetcher;
use crate::models::handle::SpeechModel;
use crate::models::registry::ModelFactory;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Speech model backed by an external synthesizer program
///
/// The program receives the text on stdin and writes one audio file. Model
/// assets are fetched from the `HuggingFace` Hub by `download()`; their snapshot
/// directory is passed to the program as `{model_dir}`.
#[derive(Debug)]
pub struct CommandModel {
    info: ModelInfo,
    synthesizer: SynthesizerConfig,
    fetcher: ModelFetcher,
    lang_code: String,
    voice: String,
    model_dir: Option<PathBuf>,
}

impl CommandModel {
    #[must_use]
    pub fn new(info: &ModelInfo, synthesizer: SynthesizerConfig, fetcher: ModelFetcher) -> Self {
        let model_dir = fetcher.cached_dir(info);
        if model_dir.is_none() {
            tracing::debug!("{} assets not cached yet", info.id);
        }

        Self {
            info: info.clone(),
            synthesizer,
            fetcher,
            lang_code: info.default_lang.to_string(),
            voice: info.default_voice.to_string(),
            model_dir,
        }
    }

    #[must_use]
    pub fn lang_code(&self) -> &str {
        &self.lang_code
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Expand argument placeholders for one synthesis call
    fn render_args(&self, output: &Path) -> Vec<String> {
        let model_dir = self
            .model_dir
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let output = output.display().to_string();

        self.synthesizer
            .args
            .iter()
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{voice}", &self.voice)
                    .replace("{lang}", &self.lang_code)
                    .replace("{model_dir}", &model_dir)
            })
            .collect()
    }
}

impl SpeechModel for CommandModel {
    fn generate_audio(&mut self, text: &str, output: &Path) -> Result<PathBuf> {
        let program = which::which(&self.synthesizer.program).map_err(|_| {
            VoiceError::Synthesis(format!(
                "synthesizer '{}' not found in PATH. Set synthesizer.program in config.toml",
                self.synthesizer.program
            ))
        })?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let args = self.render_args(output);
        tracing::debug!("Running {} {:?}", program.display(), args);

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("Failed to start synthesizer: {e}")))?;

        // Dropping stdin closes it so the program sees EOF
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| VoiceError::Synthesis("synthesizer stdin not available".to_string()))?;
            match stdin.write_all(text.as_bytes()) {
                Ok(()) => {}
                // The exit status below tells whether that was a failure
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("synthesizer closed stdin early");
                }
                Err(e) => {
                    return Err(VoiceError::Synthesis(format!("Failed to write text: {e}")));
                }
            }
        }

        let result = child
            .wait_with_output()
            .map_err(|e| VoiceError::Synthesis(format!("Synthesizer did not finish: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(VoiceError::Synthesis(format!(
                "synthesizer exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        if !output.exists() {
            return Err(VoiceError::Synthesis(format!(
                "synthesizer reported success but wrote no file at {}",
                output.display()
            )));
        }

        if output.extension().is_some_and(|ext| ext == "wav") {
            let reader = hound::WavReader::open(output)
                .map_err(|e| VoiceError::Synthesis(format!("Invalid WAV output: {e}")))?;
            let spec = reader.spec();
            #[allow(clippy::cast_precision_loss)]
            let seconds = reader.duration() as f32 / spec.sample_rate as f32;
            tracing::info!("Generated {seconds:.2}s of audio at {}", output.display());
        }

        Ok(output.to_path_buf())
    }

    fn change_language(&mut self, lang_code: &str, voice: Option<&str>) -> Result<()> {
        if lang_code.trim().is_empty() {
            return Err(VoiceError::InvalidRequest(
                "lang_code must not be empty".to_string(),
            ));
        }

        self.lang_code = lang_code.to_string();
        if let Some(voice) = voice.filter(|v| !v.is_empty()) {
            self.voice = voice.to_string();
        }

        tracing::info!(
            "{} now using language '{}' voice '{}'",
            self.info.id,
            self.lang_code,
            self.voice
        );
        Ok(())
    }

    fn download(&mut self) -> Result<()> {
        let fetched = self.fetcher.fetch(&self.info)?;
        self.model_dir = Some(fetched.dir);
        Ok(())
    }
}

/// Factory producing [`CommandModel`]s from the server configuration
#[derive(Debug, Clone)]
pub struct CommandModelFactory {
    synthesizer: SynthesizerConfig,
    fetcher: ModelFetcher,
}

impl CommandModelFactory {
    #[must_use]
    pub const fn new(synthesizer: SynthesizerConfig, fetcher: ModelFetcher) -> Self {
        Self {
            synthesizer,
            fetcher,
        }
    }
}

impl ModelFactory for CommandModelFactory {
    fn create(&self, info: &ModelInfo) -> Result<Box<dyn SpeechModel>> {
        Ok(Box::new(CommandModel::new(
            info,
            self.synthesizer.clone(),
            self.fetcher.clone(),
        )))
    }
}
