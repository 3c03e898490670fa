//! Sample data types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// A sample definition.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Sample name
    pub name: ArrayString<28>,
    /// Audio data
    pub data: SampleData,
    /// Loop start position (in frames)
    pub loop_start: u32,
    /// Loop end position (in frames, exclusive)
    pub loop_end: u32,
    /// Loop flag from the instrument header
    pub looping: bool,
    /// Base volume (0-64)
    pub default_volume: u8,
    /// Playback rate of the sample data in Hz (S3M "C2SPD")
    pub sample_rate: u32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            data: SampleData::Mono8(Vec::new()),
            loop_start: 0,
            loop_end: 0,
            looping: false,
            default_volume: 64,
            sample_rate: 8363,
        }
    }
}

impl Sample {
    /// Create a new empty sample.
    pub fn new(name: &str) -> Self {
        Self {
            name: truncated(name),
            ..Self::default()
        }
    }

    /// Get the length of the sample in frames.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sample has no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the sample has a usable loop.
    pub fn has_loop(&self) -> bool {
        self.looping && self.loop_end > self.loop_start && self.loop_end as usize <= self.len()
    }

    /// Loop length in frames (0 when the sample does not loop).
    pub fn loop_len(&self) -> u32 {
        if self.has_loop() {
            self.loop_end - self.loop_start
        } else {
            0
        }
    }
}

/// Copy as much of `s` as fits, cutting at a char boundary.
pub(crate) fn truncated<const N: usize>(s: &str) -> ArrayString<N> {
    let mut end = s.len().min(N);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    ArrayString::from(&s[..end]).unwrap_or_default()
}

/// Sample audio data.
///
/// Stereo data is stored planar: the left plane then the right plane, the
/// same way S3M lays the payload out on disk.
#[derive(Clone, Debug)]
pub enum SampleData {
    /// 8-bit mono samples
    Mono8(Vec<i8>),
    /// 16-bit mono samples
    Mono16(Vec<i16>),
    /// 8-bit stereo samples (left, right)
    Stereo8(Vec<i8>, Vec<i8>),
    /// 16-bit stereo samples (left, right)
    Stereo16(Vec<i16>, Vec<i16>),
}

impl SampleData {
    /// Get the number of sample frames.
    pub fn len(&self) -> usize {
        match self {
            SampleData::Mono8(v) => v.len(),
            SampleData::Mono16(v) => v.len(),
            SampleData::Stereo8(l, _) => l.len(),
            SampleData::Stereo16(l, _) => l.len(),
        }
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of channels in the sample data.
    pub fn num_channels(&self) -> u16 {
        match self {
            SampleData::Mono8(_) | SampleData::Mono16(_) => 1,
            SampleData::Stereo8(_, _) | SampleData::Stereo16(_, _) => 2,
        }
    }

    /// Bits per sample of the stored data.
    pub fn bits(&self) -> u16 {
        match self {
            SampleData::Mono8(_) | SampleData::Stereo8(_, _) => 8,
            SampleData::Mono16(_) | SampleData::Stereo16(_, _) => 16,
        }
    }

    /// Left (or mono) value at `pos`, scaled to 16 bits. Out of range reads 0.
    pub fn get_left(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) | SampleData::Stereo8(v, _) => {
                v.get(pos).copied().unwrap_or(0) as i16 * 256
            }
            SampleData::Mono16(v) | SampleData::Stereo16(v, _) => v.get(pos).copied().unwrap_or(0),
        }
    }

    /// Right value at `pos` (returns the mono value for mono data).
    pub fn get_right(&self, pos: usize) -> i16 {
        match self {
            SampleData::Mono8(v) | SampleData::Stereo8(_, v) => {
                v.get(pos).copied().unwrap_or(0) as i16 * 256
            }
            SampleData::Mono16(v) | SampleData::Stereo16(_, v) => v.get(pos).copied().unwrap_or(0),
        }
    }

    /// Interleave the data into native-width PCM bytes (unsigned 8-bit or
    /// little-endian signed 16-bit), the layout audio devices expect for
    /// one-shot sounds. `range` is in frames and clamped to the data.
    pub fn to_pcm_bytes(&self, range: core::ops::Range<usize>) -> Vec<u8> {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let mut out = Vec::with_capacity((end - start) * self.num_channels() as usize * 2);
        for i in start..end {
            match self {
                SampleData::Mono8(v) => out.push((v[i] as u8) ^ 0x80),
                SampleData::Stereo8(l, r) => {
                    out.push((l[i] as u8) ^ 0x80);
                    out.push((r[i] as u8) ^ 0x80);
                }
                SampleData::Mono16(v) => out.extend_from_slice(&v[i].to_le_bytes()),
                SampleData::Stereo16(l, r) => {
                    out.extend_from_slice(&l[i].to_le_bytes());
                    out.extend_from_slice(&r[i].to_le_bytes());
                }
            }
        }
        out
    }
}
