//! Pattern and note types for tracker sequences.

use alloc::vec::Vec;
use crate::effects::Effect;

/// Volume sentinel meaning "no volume in this cell, keep the channel's".
pub const VOLUME_KEEP: u8 = 65;

/// Highest note volume.
pub const VOLUME_MAX: u8 = 64;

/// Musical key of a note: two sentinels followed by the twelve semitones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key {
    /// No pitch in this cell
    #[default]
    None,
    /// Note cut: silence the channel
    Cut,
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Key {
    const SEMITONES: [Key; 12] = [
        Key::C,
        Key::CSharp,
        Key::D,
        Key::DSharp,
        Key::E,
        Key::F,
        Key::FSharp,
        Key::G,
        Key::GSharp,
        Key::A,
        Key::ASharp,
        Key::B,
    ];

    /// Key for a semitone index (0 = C, 11 = B). Larger values have no pitch.
    pub const fn from_semitone(semitone: u8) -> Self {
        if semitone < 12 {
            Self::SEMITONES[semitone as usize]
        } else {
            Key::None
        }
    }

    /// Semitone index (0 = C, 11 = B), or `None` for the sentinels.
    pub const fn semitone(self) -> Option<u8> {
        match self {
            Key::None | Key::Cut => None,
            // Discriminants of the semitones start right after the two sentinels.
            k => Some(k as u8 - 2),
        }
    }

    /// Returns true if this key carries a pitch.
    pub const fn is_pitched(self) -> bool {
        self.semitone().is_some()
    }
}

/// A single cell in a pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    /// Musical key (or a sentinel)
    pub key: Key,
    /// Octave (0-9)
    pub octave: u8,
    /// Sample index, if the cell names one
    pub sample: Option<u8>,
    /// Volume (0-64), or [`VOLUME_KEEP`]
    pub volume: u8,
    /// Effect tag
    pub effect: Effect,
    /// Effect parameter byte
    pub param: u8,
    /// False when the pattern held no data for this cell
    pub initialized: bool,
}

impl Default for Note {
    fn default() -> Self {
        Self::empty()
    }
}

impl Note {
    /// A cell with no data at all.
    pub const fn empty() -> Self {
        Self {
            key: Key::None,
            octave: 0,
            sample: None,
            volume: VOLUME_KEEP,
            effect: Effect::None,
            param: 0,
            initialized: false,
        }
    }

    /// A pitched note with an explicit volume.
    pub const fn pitch(key: Key, octave: u8, volume: u8) -> Self {
        Self {
            key,
            octave,
            volume,
            initialized: true,
            ..Self::empty()
        }
    }

    /// A note cut.
    pub const fn cut() -> Self {
        Self {
            key: Key::Cut,
            initialized: true,
            ..Self::empty()
        }
    }

    /// A cell carrying only an effect.
    pub const fn effect(effect: Effect, param: u8) -> Self {
        Self {
            effect,
            param,
            initialized: true,
            ..Self::empty()
        }
    }

    /// Builder-style sample assignment.
    pub fn with_sample(mut self, sample: u8) -> Self {
        self.sample = Some(sample);
        self
    }

    /// Builder-style effect assignment.
    pub fn with_effect(mut self, effect: Effect, param: u8) -> Self {
        self.effect = effect;
        self.param = param;
        self
    }

    /// Volume as a 0..=1 gain, or `None` when the cell keeps the previous one.
    pub fn volume_level(&self) -> Option<f32> {
        if self.volume > VOLUME_MAX {
            None
        } else {
            Some(self.volume as f32 * (1.0 / 64.0))
        }
    }
}

/// A pattern: a flat arena of notes with a channel stride.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Number of rows (64 for S3M)
    pub rows: u16,
    /// Number of channels
    pub channels: u8,
    /// Note data, stored row-major: data[row * channels + channel]
    pub data: Vec<Note>,
}

impl Pattern {
    /// Create a new pattern with empty cells.
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            data: alloc::vec![Note::empty(); rows as usize * channels as usize],
        }
    }

    /// Arena index of `(channel, row)`.
    pub fn index(&self, channel: u8, row: u16) -> usize {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        row as usize * self.channels as usize + channel as usize
    }

    /// Get a reference to a note.
    pub fn note(&self, channel: u8, row: u16) -> &Note {
        &self.data[self.index(channel, row)]
    }

    /// Get a mutable reference to a note.
    pub fn note_mut(&mut self, channel: u8, row: u16) -> &mut Note {
        let index = self.index(channel, row);
        &mut self.data[index]
    }

    /// All notes of a row, one per channel.
    pub fn row(&self, row: u16) -> &[Note] {
        let start = row as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }
}
