use crate::error::{Result, VoiceError};

/// Information about a recognized speech model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub size_mb: u64,
    pub hf_repo: &'static str,
    pub hf_revision: &'static str,
    /// Files fetched by `download()`, relative to the repo root
    pub files: &'static [&'static str],
    pub default_lang: &'static str,
    pub default_voice: &'static str,
    /// Sub-directory of the output dir that receives this model's audio
    pub output_subdir: &'static str,
}

/// Models this server knows how to instantiate
pub const MODELS: &[ModelInfo] = &[ModelInfo {
    id: "kokoro-82M",
    description: "Kokoro 82M multi-lingual TTS",
    size_mb: 330,
    hf_repo: "hexgrad/Kokoro-82M",
    hf_revision: "main",
    files: &["config.json", "kokoro-v1_0.pth", "voices/af_heart.pt"],
    default_lang: "a",
    default_voice: "af_heart",
    output_subdir: "kokoro",
}];

impl ModelInfo {
    /// Find a built-in model by id
    #[must_use]
    pub fn find(id: &str) -> Option<&'static Self> {
        MODELS.iter().find(|m| m.id == id)
    }

    /// Get all built-in model ids
    #[must_use]
    pub fn all_ids() -> Vec<&'static str> {
        MODELS.iter().map(|m| m.id).collect()
    }
}

/// The set of identifiers a registry accepts
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModelInfo>,
}

impl Catalog {
    #[must_use]
    pub const fn new(models: Vec<ModelInfo>) -> Self {
        Self { models }
    }

    /// Catalog containing every built-in model
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(MODELS.to_vec())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up `id`, failing with `UnknownModel` (plus a suggestion) if absent
    pub fn require(&self, id: &str) -> Result<&ModelInfo> {
        self.get(id).ok_or_else(|| VoiceError::UnknownModel {
            id: id.to_string(),
            suggestion: self.suggest(id),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelInfo> {
        self.models.iter()
    }

    /// Find closest match using Levenshtein distance
    #[must_use]
    pub fn suggest(&self, id: &str) -> Option<&'static str> {
        if id.is_empty() {
            return None;
        }

        self.models
            .iter()
            .map(|m| (m.id, levenshtein_distance(id, m.id)))
            .min_by_key(|(_, dist)| *dist)
            .filter(|(_, dist)| *dist <= 2) // Only suggest if within 2 edits
            .map(|(model_id, _)| model_id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Calculate Levenshtein distance between two strings
#[allow(clippy::needless_range_loop)]
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for i in 0..=len1 {
        matrix[i][0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for (i, c1) in s1_chars.iter().enumerate() {
        for (j, c2) in s2_chars.iter().enumerate() {
            let cost = usize::from(c1 != c2);
            matrix[i + 1][j + 1] = (matrix[i][j + 1] + 1)
                .min(matrix[i + 1][j] + 1)
                .min(matrix[i][j] + cost);
        }
    }

    matrix[len1][len2]
}
