//! Engine configuration.

use ms_engine::MixerConfig;
use serde::Deserialize;

/// Error type for invalid configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("output channels must be 1 or 2, got {0}")]
    InvalidChannels(u16),
    #[error("headroom must be positive, got {0}")]
    InvalidHeadroom(f32),
    #[error("{name} voice range {min}..{max} is empty or exceeds {voices} voices")]
    InvalidVoiceRange {
        name: &'static str,
        min: usize,
        max: usize,
        voices: usize,
    },
    #[error("stream buffer count must be 2 or 3, got {0}")]
    InvalidBufferCount(usize),
    #[error("stream buffers must hold at least one frame")]
    ZeroBufferFrames,
}

/// Half-open range of hardware voices, `min..max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct VoiceRange {
    pub min: usize,
    pub max: usize,
}

impl VoiceRange {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    fn check(self, name: &'static str, voices: usize) -> Result<(), ConfigError> {
        if self.min >= self.max || self.max > voices {
            return Err(ConfigError::InvalidVoiceRange {
                name,
                min: self.min,
                max: self.max,
                voices,
            });
        }
        Ok(())
    }
}

/// Module stream buffering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Device buffers per module stream (2 or 3)
    pub buffers: usize,
    /// Frames rendered into each buffer
    pub buffer_frames: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffers: 2,
            buffer_frames: 4096,
        }
    }
}

/// Settings of an [`AudioContext`](crate::AudioContext).
///
/// Every field has a default, so a host config file only needs to name the
/// values it changes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output rate in Hz
    pub sample_rate: u32,
    /// Module output channels (1 or 2)
    pub output_channels: u16,
    /// Linear interpolation in the module mixer
    pub interpolate: bool,
    /// Divisor applied to each module channel before summing
    pub headroom: f32,
    /// Hardware voices on the device
    pub voice_count: usize,
    /// Voices module streams are allocated from
    pub music_voices: VoiceRange,
    /// Voices one-shot sounds are allocated from
    pub sound_voices: VoiceRange,
    pub stream: StreamConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            output_channels: 2,
            interpolate: true,
            headroom: 4.0,
            voice_count: 16,
            music_voices: VoiceRange::new(0, 2),
            sound_voices: VoiceRange::new(2, 16),
            stream: StreamConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if !matches!(self.output_channels, 1 | 2) {
            return Err(ConfigError::InvalidChannels(self.output_channels));
        }
        if !(self.headroom > 0.0) {
            return Err(ConfigError::InvalidHeadroom(self.headroom));
        }
        self.music_voices.check("music", self.voice_count)?;
        self.sound_voices.check("sound", self.voice_count)?;
        if !(2..=3).contains(&self.stream.buffers) {
            return Err(ConfigError::InvalidBufferCount(self.stream.buffers));
        }
        if self.stream.buffer_frames == 0 {
            return Err(ConfigError::ZeroBufferFrames);
        }
        Ok(())
    }

    /// Mixer settings for module players.
    pub fn mixer(&self) -> MixerConfig {
        MixerConfig {
            sample_rate: self.sample_rate,
            channels: self.output_channels,
            interpolate: self.interpolate,
            headroom: self.headroom,
        }
    }
}
