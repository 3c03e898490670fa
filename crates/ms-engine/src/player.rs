//! Song playback: the tick clock, row processing and rendering.

use alloc::sync::Arc;
use alloc::vec::Vec;
use ms_ir::{Effect, Key, OrderEntry, Song};

use crate::channel::MixerChannel;
use crate::frequency::{pitch_multiplier, samples_per_tick};
use crate::mixer::MixerConfig;

/// Errors rejected when a player is created.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerError {
    #[error("output sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("unsupported output channel count {0}")]
    InvalidChannels(u16),
    #[error("headroom must be positive, got {0}")]
    InvalidHeadroom(f32),
    #[error("invalid timing: speed {speed}, tempo {tempo}")]
    InvalidTiming { speed: u8, tempo: u8 },
    #[error("song has no playable order entry")]
    NoPlayableOrder,
}

/// Where the clock currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Index into the order list
    pub order: usize,
    /// Pattern index referenced by that order entry
    pub pattern: u8,
    /// Row within the pattern
    pub row: u16,
    /// Next tick to process within the row
    pub tick: u8,
}

/// Plays a [`Song`] into interleaved 16-bit frames.
pub struct Player {
    song: Arc<Song>,
    config: MixerConfig,
    channels: Vec<MixerChannel>,
    order: usize,
    row: u16,
    tick: u8,
    speed: u8,
    tempo: u8,
    samples_per_tick: u32,
    sample_counter: u32,
    /// Order to continue at when the row ends (PositionJump)
    jump_order: Option<usize>,
    /// Leave the pattern when the row ends (PatternBreak)
    pattern_break: bool,
}

impl Player {
    /// Create a player positioned at the first playable order.
    pub fn new(song: Arc<Song>, config: MixerConfig) -> Result<Self, PlayerError> {
        if config.sample_rate == 0 {
            return Err(PlayerError::ZeroSampleRate);
        }
        if !matches!(config.channels, 1 | 2) {
            return Err(PlayerError::InvalidChannels(config.channels));
        }
        if !(config.headroom > 0.0) {
            return Err(PlayerError::InvalidHeadroom(config.headroom));
        }
        let (speed, tempo) = (song.initial_speed, song.initial_tempo);
        if speed == 0 || tempo == 0 {
            return Err(PlayerError::InvalidTiming { speed, tempo });
        }
        let order = song.next_playable_order(0).ok_or(PlayerError::NoPlayableOrder)?;

        let channels = song
            .channels
            .iter()
            .map(|settings| {
                if song.stereo {
                    MixerChannel::panned(settings.pan)
                } else {
                    MixerChannel::new()
                }
            })
            .collect();

        Ok(Self {
            samples_per_tick: samples_per_tick(config.sample_rate, tempo),
            song,
            config,
            channels,
            order,
            row: 0,
            tick: 0,
            speed,
            tempo,
            sample_counter: 0,
            jump_order: None,
            pattern_break: false,
        })
    }

    /// The song being played.
    pub fn song(&self) -> &Arc<Song> {
        &self.song
    }

    /// Output settings.
    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Current clock position.
    pub fn position(&self) -> PlaybackPosition {
        let pattern = match self.song.order.get(self.order) {
            Some(OrderEntry::Pattern(p)) => *p,
            _ => 0,
        };
        PlaybackPosition {
            order: self.order,
            pattern,
            row: self.row,
            tick: self.tick,
        }
    }

    /// Ticks per row.
    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Tempo in BPM.
    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    /// Output frames per tick at the current tempo.
    pub fn samples_per_tick(&self) -> u32 {
        self.samples_per_tick
    }

    /// Per-channel mixing state.
    pub fn channels(&self) -> &[MixerChannel] {
        &self.channels
    }

    /// Restart at `order` (or the next playable order after it) with
    /// silent channels and the song's initial timing.
    pub fn seek(&mut self, order: usize) {
        for channel in &mut self.channels {
            let (left_gain, right_gain) = (channel.left_gain, channel.right_gain);
            *channel = MixerChannel {
                left_gain,
                right_gain,
                ..MixerChannel::new()
            };
        }
        self.speed = self.song.initial_speed;
        self.tempo = self.song.initial_tempo;
        self.samples_per_tick = samples_per_tick(self.config.sample_rate, self.tempo);
        self.sample_counter = 0;
        self.tick = 0;
        self.jump_order = None;
        self.pattern_break = false;
        self.goto_order(order);
    }

    /// Render interleaved frames into `out`, overwriting its contents.
    ///
    /// A trailing partial frame is left silent.
    pub fn render(&mut self, out: &mut [i16]) {
        out.fill(0);
        let stride = self.config.channels as usize;
        for frame in out.chunks_exact_mut(stride) {
            if self.sample_counter == 0 {
                self.process_tick();
            }

            let song = &*self.song;
            for channel in self.channels.iter_mut() {
                if let Some(sample) = channel.sample_index.and_then(|i| song.samples.get(i)) {
                    channel.mix(sample, frame, &self.config);
                }
            }

            self.sample_counter += 1;
            if self.sample_counter >= self.samples_per_tick {
                self.sample_counter = 0;
            }
        }
    }

    fn process_tick(&mut self) {
        if self.tick == 0 {
            self.process_row();
        }
        let rate = self.config.sample_rate;
        for channel in &mut self.channels {
            channel.apply_tick_effect(rate);
        }

        self.tick += 1;
        if self.tick >= self.speed {
            self.tick = 0;
            self.advance_row();
        }
    }

    fn process_row(&mut self) {
        let song = &*self.song;
        let Some(pattern) = song.pattern_at(self.order) else {
            return;
        };
        if self.row >= pattern.rows {
            return;
        }
        let rate = self.config.sample_rate;
        let mut speed = None;
        let mut tempo = None;

        for (note, channel) in pattern.row(self.row).iter().zip(self.channels.iter_mut()) {
            if !note.initialized {
                continue;
            }
            channel.effect = note.effect;
            channel.param = note.param;

            match note.key {
                Key::Cut => channel.cut(),
                key => {
                    let index = note.sample.map(usize::from).or(channel.sample_index);
                    match (key.semitone(), index) {
                        (Some(semitone), Some(index)) => {
                            let base = song.samples.get(index).map_or(0, |s| s.sample_rate);
                            let pitch = pitch_multiplier(semitone, note.octave);
                            channel.trigger(index, base as f32 * pitch, rate);
                        }
                        (None, Some(index)) => channel.sample_index = Some(index),
                        _ => {}
                    }
                }
            }

            if note.volume_level().is_some() {
                channel.set_note_volume(note.volume);
            }

            match note.effect {
                Effect::SetSpeed if note.param > 0 => speed = Some(note.param),
                Effect::SetTempo if note.param > 0 => tempo = Some(note.param),
                Effect::PatternBreak => self.pattern_break = true,
                Effect::PositionJump => self.jump_order = Some(note.param as usize),
                _ => {}
            }
        }

        if let Some(speed) = speed {
            self.speed = speed;
        }
        if let Some(tempo) = tempo {
            self.tempo = tempo;
            self.samples_per_tick = samples_per_tick(rate, tempo);
        }
    }

    fn advance_row(&mut self) {
        let break_pattern = core::mem::take(&mut self.pattern_break);
        if let Some(order) = self.jump_order.take() {
            self.goto_order(order);
        } else if break_pattern {
            self.goto_order(self.order + 1);
        } else {
            self.row += 1;
            let rows = self.song.pattern_at(self.order).map_or(0, |p| p.rows);
            if self.row >= rows {
                self.goto_order(self.order + 1);
            }
        }
    }

    fn goto_order(&mut self, order: usize) {
        let start = if order >= self.song.order.len() { 0 } else { order };
        if let Some(next) = self.song.next_playable_order(start) {
            if next <= self.order && order > self.order {
                log::trace!("order list wrapped to {next}");
            }
            self.order = next;
        }
        self.row = 0;
    }
}
