//! Voice/buffer audio device surface.
//!
//! Voices play queues of PCM buffers. Buffers are created and filled by the
//! host, queued on a voice and handed back as "processed" once played.

use slotmap::new_key_type;

new_key_type! {
    /// Handle of a device buffer.
    pub struct BufferHandle;
}

/// Error type for device operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("voice {0} does not exist")]
    InvalidVoice(usize),
    #[error("unknown buffer handle")]
    InvalidBuffer,
    #[error("buffer is queued on a voice")]
    BufferInUse,
    #[error("voice {0} buffer queue is full")]
    QueueFull(usize),
    #[error("{format:?} data of {len} samples/bytes is not a whole number of frames")]
    InvalidLength { format: PcmFormat, len: usize },
    #[error("{0:?} expects data of a different width")]
    FormatMismatch(PcmFormat),
    #[error("buffer sample rate must be non-zero")]
    InvalidRate,
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Layout of PCM data handed to [`AudioDevice::update_buffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcmFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl PcmFormat {
    /// Format for a channel count (1 or 2) and bit depth (8 or 16).
    pub fn from_layout(channels: u16, bits: u16) -> Option<Self> {
        match (channels, bits) {
            (1, 8) => Some(PcmFormat::Mono8),
            (1, 16) => Some(PcmFormat::Mono16),
            (2, 8) => Some(PcmFormat::Stereo8),
            (2, 16) => Some(PcmFormat::Stereo16),
            _ => None,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Mono16 => 1,
            PcmFormat::Stereo8 | PcmFormat::Stereo16 => 2,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            PcmFormat::Mono8 | PcmFormat::Stereo8 => 8,
            PcmFormat::Mono16 | PcmFormat::Stereo16 => 16,
        }
    }

    /// Bytes per interleaved frame.
    pub fn frame_bytes(self) -> usize {
        (self.channels() * self.bits() / 8) as usize
    }
}

/// PCM payload: native 16-bit samples, or raw bytes (unsigned 8-bit or
/// little-endian 16-bit).
#[derive(Clone, Copy, Debug)]
pub enum PcmData<'a> {
    I16(&'a [i16]),
    Bytes(&'a [u8]),
}

/// A device with a fixed set of voices that play queued buffers.
///
/// Queries on a voice that does not exist report an idle voice.
pub trait AudioDevice {
    /// Number of hardware voices.
    fn voice_count(&self) -> usize;

    fn create_buffer(&mut self) -> Result<BufferHandle, DeviceError>;

    /// Free a buffer. Fails while it is queued on a voice.
    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError>;

    /// Replace a buffer's contents. Fails while it is queued on a voice.
    fn update_buffer(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        data: PcmData<'_>,
        rate: u32,
    ) -> Result<(), DeviceError>;

    /// Stop `voice`, drop its queue and start `buffer` from the beginning.
    fn play_buffer(
        &mut self,
        voice: usize,
        buffer: BufferHandle,
        pitch: f32,
        volume: f32,
        looping: bool,
    ) -> Result<(), DeviceError>;

    /// Append `buffer` to the voice queue and set the voice loop flag.
    /// Does not start a stopped voice.
    fn queue_buffer(
        &mut self,
        voice: usize,
        buffer: BufferHandle,
        looping: bool,
    ) -> Result<(), DeviceError>;

    /// Set the loop flag. A looping voice cycles its queue and never
    /// reports buffers as processed.
    fn set_looping(&mut self, voice: usize, looping: bool) -> Result<(), DeviceError>;

    /// True while the voice is playing (not paused, not stopped).
    fn is_playing(&self, voice: usize) -> bool;

    /// Buffers played to the end and not yet unqueued.
    fn processed_count(&self, voice: usize) -> usize;

    /// Buffers on the voice, including processed ones not yet unqueued.
    fn queued_count(&self, voice: usize) -> usize;

    /// Remove the oldest processed buffer from the voice.
    fn unqueue_processed(&mut self, voice: usize) -> Option<BufferHandle>;

    /// Stop immediately and drop every queued buffer.
    fn stop(&mut self, voice: usize) -> Result<(), DeviceError>;

    fn pause(&mut self, voice: usize) -> Result<(), DeviceError>;

    /// Continue a paused voice, or restart a stopped voice that still has
    /// buffers queued.
    fn resume(&mut self, voice: usize) -> Result<(), DeviceError>;
}
