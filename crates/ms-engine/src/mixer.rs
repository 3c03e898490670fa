//! Mixer configuration and sample accumulation.

/// Output format and quality settings of the mixer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MixerConfig {
    /// Output rate in Hz
    pub sample_rate: u32,
    /// Interleaved output channels (1 or 2)
    pub channels: u16,
    /// Linear interpolation between neighbouring sample frames
    pub interpolate: bool,
    /// Divisor applied to every channel before it is summed
    pub headroom: f32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            interpolate: false,
            headroom: 4.0,
        }
    }
}

/// Add `value` to an output sample, clipping to the 16-bit range.
///
/// Clipping happens per addition, so the order channels are summed in can
/// change the result once the mix saturates.
#[inline]
pub fn add_clamped(acc: i16, value: f32) -> i16 {
    (acc as i32 + value as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
