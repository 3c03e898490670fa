//! Per-channel playback state.

use ms_ir::{Effect, Sample, VOLUME_MAX};

use crate::frequency::{portamento_step, rate_to_increment, FRAC_BITS, FRAC_MASK};
use crate::mixer::{add_clamped, MixerConfig};

/// Mixing state for a single pattern channel.
#[derive(Clone, Debug)]
pub struct MixerChannel {
    /// Sample currently assigned to the channel
    pub sample_index: Option<usize>,
    /// Position in the sample (16.16 fixed-point frames)
    pub position: u64,
    /// Playback increment per output frame (16.16 fixed-point)
    pub increment: u32,
    /// Effective playback rate in Hz, after pitch and portamento
    pub sample_rate: f32,
    /// Gain (0.0-1.0)
    pub volume: f32,
    /// Volume slide accumulator (0-64)
    pub volume_acc: u8,
    /// Effect of the last initialized cell
    pub effect: Effect,
    /// Parameter of the last initialized cell
    pub param: u8,
    /// Left output gain
    pub left_gain: f32,
    /// Right output gain
    pub right_gain: f32,
    /// Is the channel producing sound?
    pub playing: bool,
}

impl Default for MixerChannel {
    fn default() -> Self {
        Self {
            sample_index: None,
            position: 0,
            increment: 0,
            sample_rate: 0.0,
            volume: 1.0,
            volume_acc: VOLUME_MAX,
            effect: Effect::None,
            param: 0,
            left_gain: 1.0,
            right_gain: 1.0,
            playing: false,
        }
    }
}

impl MixerChannel {
    /// A channel that sends equal signal to both sides.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel panned to `pan` (0 = left, 15 = right).
    pub fn panned(pan: u8) -> Self {
        let right = pan.min(15) as f32 / 15.0;
        Self {
            left_gain: 1.0 - right,
            right_gain: right,
            ..Self::default()
        }
    }

    /// Start `sample_index` from the beginning at `rate` Hz.
    pub fn trigger(&mut self, sample_index: usize, rate: f32, output_rate: u32) {
        self.sample_index = Some(sample_index);
        self.position = 0;
        self.playing = true;
        self.set_rate(rate, output_rate);
    }

    /// Silence the channel. Position and loop bookkeeping stop advancing.
    pub fn cut(&mut self) {
        self.volume = 0.0;
        self.sample_rate = 0.0;
        self.increment = 0;
    }

    /// Stop playback and forget the position.
    pub fn stop(&mut self) {
        self.playing = false;
        self.position = 0;
    }

    /// Change the playback rate and recompute the increment.
    pub fn set_rate(&mut self, rate: f32, output_rate: u32) {
        self.sample_rate = rate.max(0.0);
        self.increment = rate_to_increment(self.sample_rate, output_rate);
    }

    /// Apply a cell volume (0-64). Also seeds the volume slide accumulator.
    pub fn set_note_volume(&mut self, volume: u8) {
        let volume = volume.min(VOLUME_MAX);
        self.volume_acc = volume;
        self.volume = volume as f32 / VOLUME_MAX as f32;
    }

    /// Run the per-tick part of the current effect.
    pub fn apply_tick_effect(&mut self, output_rate: u32) {
        match self.effect {
            Effect::VolumeSlide => {
                let up = self.param >> 4;
                let down = self.param & 0x0F;
                let acc = if up != 0 {
                    self.volume_acc.saturating_add(up).min(VOLUME_MAX)
                } else {
                    self.volume_acc.saturating_sub(down)
                };
                self.set_note_volume(acc);
            }
            Effect::PortamentoUp => {
                let rate = self.sample_rate + portamento_step(self.sample_rate, self.param);
                self.set_rate(rate, output_rate);
            }
            Effect::PortamentoDown => {
                let rate = self.sample_rate - portamento_step(self.sample_rate, self.param);
                self.set_rate(rate, output_rate);
            }
            _ => {}
        }
    }

    /// Mix one output frame of this channel into `out`.
    ///
    /// `out` holds one value per output channel (1 or 2). The position
    /// advances even when the channel is silent.
    pub fn mix(&mut self, sample: &Sample, out: &mut [i16], config: &MixerConfig) {
        if !self.playing {
            return;
        }
        let len = sample.len();
        let index = (self.position >> FRAC_BITS) as usize;

        if self.volume > 0.0 && index < len {
            let frac = (self.position & FRAC_MASK) as i64;
            let next = if sample.has_loop() && index + 1 >= sample.loop_end as usize {
                sample.loop_start as usize
            } else {
                index + 1
            };
            let fetch = |a: i16, b: i16| -> f32 {
                if config.interpolate {
                    (a as i64 + (((b as i64 - a as i64) * frac) >> FRAC_BITS)) as f32
                } else {
                    a as f32
                }
            };
            let left = fetch(sample.data.get_left(index), sample.data.get_left(next));
            let gain = self.volume / config.headroom;

            match out {
                [mono] => {
                    let value = if sample.data.num_channels() == 2 {
                        let right = fetch(sample.data.get_right(index), sample.data.get_right(next));
                        (left + right) * 0.5
                    } else {
                        left
                    };
                    *mono = add_clamped(*mono, value * gain);
                }
                [l, r, ..] => {
                    if sample.data.num_channels() == 2 {
                        let right = fetch(sample.data.get_right(index), sample.data.get_right(next));
                        *l = add_clamped(*l, left * gain);
                        *r = add_clamped(*r, right * gain);
                    } else {
                        *l = add_clamped(*l, left * gain * self.left_gain);
                        *r = add_clamped(*r, left * gain * self.right_gain);
                    }
                }
                [] => {}
            }
        }

        self.advance(sample);
    }

    /// Step the position by one output frame, wrapping or ending the sample.
    fn advance(&mut self, sample: &Sample) {
        self.position += self.increment as u64;
        let index = self.position >> FRAC_BITS;

        if sample.has_loop() {
            let loop_end = sample.loop_end as u64;
            if index >= loop_end {
                let loop_len = (sample.loop_len() as u64) << FRAC_BITS;
                let overshoot = self.position - (loop_end << FRAC_BITS);
                self.position = ((sample.loop_start as u64) << FRAC_BITS) + overshoot % loop_len;
            }
        } else if index >= sample.len() as u64 {
            self.playing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use approx::assert_relative_eq;
    use ms_ir::SampleData;

    const RATE: u32 = 8000;

    fn config() -> MixerConfig {
        MixerConfig {
            sample_rate: RATE,
            channels: 1,
            interpolate: false,
            headroom: 1.0,
        }
    }

    fn ramp(len: i16) -> Sample {
        let mut sample = Sample::new("ramp");
        sample.data = SampleData::Mono16((0..len).map(|v| v * 100).collect());
        sample
    }

    fn render(ch: &mut MixerChannel, sample: &Sample, frames: usize) -> alloc::vec::Vec<i16> {
        let cfg = config();
        let mut out = vec![0i16; frames];
        for value in out.iter_mut() {
            ch.mix(sample, core::slice::from_mut(value), &cfg);
        }
        out
    }

    #[test]
    fn unity_rate_reads_every_frame() {
        let sample = ramp(4);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        assert_eq!(render(&mut ch, &sample, 4), vec![0, 100, 200, 300]);
        assert!(!ch.playing);
    }

    #[test]
    fn half_rate_repeats_frames() {
        let sample = ramp(2);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32 / 2.0, RATE);
        assert_eq!(render(&mut ch, &sample, 4), vec![0, 0, 100, 100]);
    }

    #[test]
    fn loop_wraps_to_loop_start() {
        let mut sample = ramp(4);
        sample.looping = true;
        sample.loop_start = 2;
        sample.loop_end = 4;
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        assert_eq!(render(&mut ch, &sample, 8), vec![0, 100, 200, 300, 200, 300, 200, 300]);
        assert!(ch.playing);
    }

    #[test]
    fn loop_wrap_keeps_overshoot() {
        let mut sample = ramp(6);
        sample.looping = true;
        sample.loop_start = 1;
        sample.loop_end = 4;
        let mut ch = MixerChannel::new();
        // three frames per output frame
        ch.trigger(0, RATE as f32 * 3.0, RATE);
        assert_eq!(render(&mut ch, &sample, 3), vec![0, 300, 300]);
        assert_eq!(ch.position >> FRAC_BITS, 3);
    }

    #[test]
    fn cut_silences_and_holds_position() {
        let sample = ramp(8);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        render(&mut ch, &sample, 2);
        ch.cut();
        assert_eq!(render(&mut ch, &sample, 3), vec![0, 0, 0]);
        assert_eq!(ch.position >> FRAC_BITS, 2);
        assert_eq!(ch.sample_rate, 0.0);
    }

    #[test]
    fn zero_volume_still_advances() {
        let sample = ramp(8);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        ch.set_note_volume(0);
        assert_eq!(render(&mut ch, &sample, 3), vec![0, 0, 0]);
        assert_eq!(ch.position >> FRAC_BITS, 3);
    }

    #[test]
    fn interpolation_blends_neighbours() {
        let sample = ramp(4);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32 / 2.0, RATE);
        let cfg = MixerConfig {
            interpolate: true,
            ..config()
        };
        let mut out = [0i16; 3];
        for value in out.iter_mut() {
            ch.mix(&sample, core::slice::from_mut(value), &cfg);
        }
        assert_eq!(out, [0, 50, 100]);
    }

    #[test]
    fn interpolation_spans_full_scale_step() {
        let mut sample = Sample::new("step");
        sample.data = SampleData::Mono16(vec![i16::MIN, i16::MAX, i16::MIN, i16::MAX]);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        ch.position = 0xC000;
        let cfg = MixerConfig {
            interpolate: true,
            ..config()
        };
        let mut out = [0i16; 2];
        for value in out.iter_mut() {
            ch.mix(&sample, core::slice::from_mut(value), &cfg);
        }
        // 0.75 of a full-scale step up, then down (shift floors)
        assert_eq!(out, [16383, -16385]);
    }

    #[test]
    fn volume_slide_up_and_down() {
        let mut ch = MixerChannel::new();
        ch.set_note_volume(60);
        ch.effect = Effect::VolumeSlide;
        ch.param = 0x30;
        ch.apply_tick_effect(RATE);
        assert_eq!(ch.volume_acc, 63);
        ch.apply_tick_effect(RATE);
        assert_eq!(ch.volume_acc, 64);

        ch.param = 0x05;
        ch.set_note_volume(3);
        ch.apply_tick_effect(RATE);
        assert_eq!(ch.volume_acc, 0);
        assert_eq!(ch.volume, 0.0);
    }

    #[test]
    fn volume_slide_prefers_up_nibble() {
        let mut ch = MixerChannel::new();
        ch.set_note_volume(32);
        ch.effect = Effect::VolumeSlide;
        ch.param = 0x24;
        ch.apply_tick_effect(RATE);
        assert_eq!(ch.volume_acc, 34);
        assert_relative_eq!(ch.volume, 34.0 / 64.0);
    }

    #[test]
    fn portamento_moves_rate() {
        let mut ch = MixerChannel::new();
        ch.trigger(0, 8363.0, RATE);
        ch.effect = Effect::PortamentoUp;
        ch.param = 2;
        ch.apply_tick_effect(RATE);
        assert_relative_eq!(ch.sample_rate, 8363.0 + 3_546_895.0 / 8363.0 * 2.0, epsilon = 0.01);

        ch.effect = Effect::PortamentoDown;
        ch.param = 0xFF;
        for _ in 0..100 {
            ch.apply_tick_effect(RATE);
        }
        assert!(ch.sample_rate >= 0.0);
        assert_eq!(ch.increment, 0);
    }

    #[test]
    fn pan_splits_mono_source() {
        let mut sample = Sample::new("dc");
        sample.data = SampleData::Mono16(vec![15000; 4]);
        let mut ch = MixerChannel::panned(15);
        ch.trigger(0, RATE as f32, RATE);
        let cfg = MixerConfig {
            channels: 2,
            ..config()
        };
        let mut frame = [0i16; 2];
        ch.mix(&sample, &mut frame, &cfg);
        assert_eq!(frame, [0, 15000]);
    }

    #[test]
    fn stereo_source_keeps_planes() {
        let mut sample = Sample::new("st");
        sample.data = SampleData::Stereo16(vec![1000; 2], vec![-1000; 2]);
        let mut ch = MixerChannel::new();
        ch.trigger(0, RATE as f32, RATE);
        let cfg = MixerConfig {
            channels: 2,
            ..config()
        };
        let mut frame = [0i16; 2];
        ch.mix(&sample, &mut frame, &cfg);
        assert_eq!(frame, [1000, -1000]);

        let mut mono = [0i16; 1];
        ch.mix(&sample, &mut mono, &config());
        assert_eq!(mono, [0]);
    }
}
