use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Capability every speech model implementation provides
///
/// All methods are blocking and may take seconds to minutes. They are only ever
/// called from worker threads, never from the async request layer.
pub trait SpeechModel: Send {
    /// Synthesize `text` into an audio file at `output`, returning the written location
    fn generate_audio(&mut self, text: &str, output: &Path) -> Result<PathBuf>;

    /// Switch language, and voice when given. Affects later `generate_audio` calls only.
    fn change_language(&mut self, lang_code: &str, voice: Option<&str>) -> Result<()>;

    /// Fetch or warm up model assets. Idempotent; failures must be reported.
    fn download(&mut self) -> Result<()>;
}

/// Shared reference to an instantiated model
///
/// Calls are serialized per handle, so a language change never interleaves with
/// a synthesis running on the same model.
#[derive(Clone)]
pub struct ModelHandle {
    id: Arc<str>,
    inner: Arc<Mutex<Box<dyn SpeechModel>>>,
}

impl ModelHandle {
    #[must_use]
    pub fn new(id: &str, model: Box<dyn SpeechModel>) -> Self {
        Self {
            id: Arc::from(id),
            inner: Arc::new(Mutex::new(model)),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn generate_audio(&self, text: &str, output: &Path) -> Result<PathBuf> {
        self.inner.lock().generate_audio(text, output)
    }

    pub fn change_language(&self, lang_code: &str, voice: Option<&str>) -> Result<()> {
        self.inner.lock().change_language(lang_code, voice)
    }

    pub fn download(&self) -> Result<()> {
        self.inner.lock().download()
    }

    /// Whether two handles refer to the same instantiated model
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("model", &"dyn SpeechModel { ... }")
            .finish()
    }
}
