pub mod audio_system;
pub mod config;
pub mod error;
pub mod utils;

pub use audio_system::{
    Ease, EmitId, FadeRequest, FileLoader, MemoryLoader, OfflineGraph, RodioGraph, SoundBus,
    SoundEvent, SoundId, SoundOptions, SoundState,
};
pub use config::BusConfig;
pub use error::{AppResult, AudioError, ConfigError, NameError};
