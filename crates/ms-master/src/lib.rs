//! Audio context and streaming buffer controller for the modsound engine.
//!
//! An [`AudioContext`] owns an audio device, the loaded modules and sounds,
//! and the module streams feeding hardware voices. The host calls
//! [`AudioContext::update`] once per frame.

mod config;
mod context;
mod stream;
mod wav;

pub use config::{ConfigError, EngineConfig, StreamConfig, VoiceRange};
pub use context::{AudioContext, AudioEvent, ContextError, ModuleId, SoundId};
pub use stream::{ModuleStream, SoundStream, MAX_STREAM_BUFFERS};
pub use wav::{wav_bytes, write_wav};

// Re-export common types so hosts don't need the lower crates directly.
pub use ms_audio::{AudioDevice, SoftwareDevice};
pub use ms_engine::{Frame, MixerConfig, PlaybackPosition};
pub use ms_formats::FormatError;
pub use ms_ir::{Sample, Song};
