//! Song structure and play order.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::pattern::Pattern;
use crate::sample::{truncated, Sample};

/// Pan value for the centre of the 0..=15 range.
pub const PAN_CENTER: u8 = 8;

/// A complete song.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub title: ArrayString<28>,
    /// Initial tempo in BPM
    pub initial_tempo: u8,
    /// Initial speed (ticks per row)
    pub initial_speed: u8,
    /// Global volume (0-64)
    pub global_volume: u8,
    /// Master volume (0-127)
    pub master_volume: u8,
    /// Mix the song in stereo
    pub stereo: bool,
    /// Play order
    pub order: Vec<OrderEntry>,
    /// Patterns, addressed by the order list
    pub patterns: Vec<Pattern>,
    /// Samples, addressed by note sample index
    pub samples: Vec<Sample>,
    /// Per-channel settings
    pub channels: Vec<ChannelSettings>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            initial_tempo: 125,
            initial_speed: 6,
            global_volume: 64,
            master_volume: 48,
            stereo: false,
            order: Vec::new(),
            patterns: Vec::new(),
            samples: Vec::new(),
            channels: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        Self {
            title: truncated(title),
            ..Self::default()
        }
    }

    /// Create a song with a given number of centred channels.
    pub fn with_channels(title: &str, num_channels: u8) -> Self {
        let mut song = Self::new(title);
        song.channels = (0..num_channels).map(|_| ChannelSettings::default()).collect();
        song
    }

    /// Number of pattern-channels.
    pub fn num_channels(&self) -> u8 {
        self.channels.len() as u8
    }

    /// Pattern referenced by the order entry at `order`, if it is playable.
    pub fn pattern_at(&self, order: usize) -> Option<&Pattern> {
        match self.order.get(order)? {
            OrderEntry::Pattern(idx) => self.patterns.get(*idx as usize),
            OrderEntry::Skip => None,
        }
    }

    /// First playable order at or after `start`, wrapping to the beginning.
    pub fn next_playable_order(&self, start: usize) -> Option<usize> {
        let len = self.order.len();
        if len == 0 {
            return None;
        }
        (0..len)
            .map(|i| (start + i) % len)
            .find(|&o| self.pattern_at(o).is_some())
    }
}

/// An entry in the order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    /// Play pattern with this index
    Pattern(u8),
    /// Marker entry; playback moves past it
    Skip,
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Is the channel enabled?
    pub enabled: bool,
    /// Pan position (0 = left, 15 = right)
    pub pan: u8,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pan: PAN_CENTER,
        }
    }
}
