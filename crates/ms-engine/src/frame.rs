//! Stereo output frame.

/// A stereo audio frame (16-bit integer).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    /// Create a silent frame.
    pub const fn silence() -> Self {
        Self { left: 0, right: 0 }
    }

    /// Create a mono frame (same value for both channels).
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Read frame `index` of an interleaved buffer with `channels` channels.
    ///
    /// Mono input is duplicated; out of range reads silence.
    pub fn from_interleaved(data: &[i16], channels: u16, index: usize) -> Self {
        match channels {
            1 => data.get(index).copied().map_or(Self::silence(), Self::mono),
            _ => {
                let base = index * channels as usize;
                match (data.get(base), data.get(base + 1)) {
                    (Some(&left), Some(&right)) => Self { left, right },
                    _ => Self::silence(),
                }
            }
        }
    }

    /// Mix another frame into this one, clipping to the 16-bit range.
    pub fn mix(&mut self, other: Frame) {
        let left = (self.left as i32 + other.left as i32).clamp(-32768, 32767);
        let right = (self.right as i32 + other.right as i32).clamp(-32768, 32767);
        self.left = left as i16;
        self.right = right as i16;
    }

    /// Scale by a gain (1.0 = unchanged).
    pub fn scaled(self, gain: f32) -> Self {
        let scale = |v: i16| (v as f32 * gain).clamp(-32768.0, 32767.0) as i16;
        Self {
            left: scale(self.left),
            right: scale(self.right),
        }
    }
}
