use thiserror::Error;

/// Library errors using thiserror for structured error handling.
///
/// Playback control never returns these to the caller: the bus logs them and
/// degrades (the sound simply does not play). They surface from loaders,
/// graphs, name parsing and configuration.

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio playback failed")]
    PlaybackFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("The event \"{0}\" is not supported")]
    UnknownEvent(String),

    #[error("Unknown easing curve \"{0}\"")]
    UnknownEase(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
