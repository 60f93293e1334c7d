use thiserror::Error;

/// Main error type for voicestudio
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Model '{id}' not found{}", suggestion_hint(.suggestion))]
    UnknownModel {
        id: String,
        suggestion: Option<&'static str>,
    },

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Channel setup failed: {0}")]
    ChannelSetup(String),

    #[error("Server overloaded: {limit} jobs already queued")]
    Overloaded { limit: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Status store error: {0}\n\nTroubleshooting:\n- Check that storage.data_dir is writable\n- Delete a corrupted status file to start from an empty store")]
    Store(String),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/voicestudio/config.toml\n- Override the path with VOICESTUDIO_CONFIG\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

fn suggestion_hint(suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(name) => format!(". Did you mean '{name}'?"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;
