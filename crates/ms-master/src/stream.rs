//! Buffer streaming onto hardware voices.

use arrayvec::ArrayVec;
use ms_audio::{AudioDevice, BufferHandle, DeviceError, PcmData, PcmFormat};
use ms_engine::Player;
use ms_ir::{Sample, SampleData};

use crate::config::StreamConfig;

/// Most buffers a module stream cycles through.
pub const MAX_STREAM_BUFFERS: usize = 3;

fn module_format(channels: u16) -> PcmFormat {
    if channels == 1 {
        PcmFormat::Mono16
    } else {
        PcmFormat::Stereo16
    }
}

/// Endless module playback through a small ring of device buffers.
///
/// Every buffer is rendered when the stream is created. Afterwards each
/// finished buffer is unqueued, rendered again and put back at the end of
/// the voice queue.
pub struct ModuleStream {
    player: Player,
    voice: Option<usize>,
    buffers: ArrayVec<BufferHandle, MAX_STREAM_BUFFERS>,
    /// Buffer the next finished notification refers to
    current: usize,
    scratch: Vec<i16>,
    format: PcmFormat,
}

impl ModuleStream {
    /// Create the stream's device buffers and render every one of them.
    ///
    /// No voice is touched; on error the buffers created so far are freed.
    pub fn new<D: AudioDevice + ?Sized>(
        device: &mut D,
        player: Player,
        config: &StreamConfig,
    ) -> Result<Self, DeviceError> {
        let channels = player.config().channels;
        let mut stream = Self {
            scratch: vec![0; config.buffer_frames * channels as usize],
            format: module_format(channels),
            player,
            voice: None,
            buffers: ArrayVec::new(),
            current: 0,
        };
        let count = config.buffers.clamp(2, MAX_STREAM_BUFFERS);
        for _ in 0..count {
            if let Err(e) = stream.add_buffer(device) {
                stream.release(device)?;
                return Err(e);
            }
        }
        Ok(stream)
    }

    fn add_buffer<D: AudioDevice + ?Sized>(&mut self, device: &mut D) -> Result<(), DeviceError> {
        let buffer = device.create_buffer()?;
        self.buffers.push(buffer);
        self.fill(device, buffer)
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    /// Voice the stream plays on, once started.
    pub fn voice(&self) -> Option<usize> {
        self.voice
    }

    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    /// Play the first buffer on `voice` and queue the rest.
    pub fn start<D: AudioDevice + ?Sized>(
        &mut self,
        device: &mut D,
        voice: usize,
        volume: f32,
    ) -> Result<(), DeviceError> {
        self.voice = Some(voice);
        self.current = 0;
        device.play_buffer(voice, self.buffers[0], 1.0, volume, false)?;
        for &buffer in &self.buffers[1..] {
            device.queue_buffer(voice, buffer, false)?;
        }
        log::debug!("module stream started on voice {voice} with {} buffers", self.buffers.len());
        Ok(())
    }

    /// Service one finished-buffer notification.
    pub fn on_buffer_finished<D: AudioDevice + ?Sized>(
        &mut self,
        device: &mut D,
    ) -> Result<(), DeviceError> {
        let Some(voice) = self.voice else {
            return Ok(());
        };
        let Some(finished) = device.unqueue_processed(voice) else {
            return Ok(());
        };
        if finished != self.buffers[self.current] {
            log::warn!("voice {voice} finished buffers out of order");
        }

        self.fill(device, finished)?;
        device.queue_buffer(voice, finished, false)?;
        self.current = (self.current + 1) % self.buffers.len();

        if !device.is_playing(voice) {
            log::warn!("module stream on voice {voice} underran, restarting");
            device.resume(voice)?;
        }
        Ok(())
    }

    /// Stop the voice and free the device buffers.
    pub fn release<D: AudioDevice + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        if let Some(voice) = self.voice {
            device.stop(voice)?;
        }
        for buffer in self.buffers {
            device.delete_buffer(buffer)?;
        }
        Ok(())
    }

    fn fill<D: AudioDevice + ?Sized>(
        &mut self,
        device: &mut D,
        buffer: BufferHandle,
    ) -> Result<(), DeviceError> {
        self.player.render(&mut self.scratch);
        let rate = self.player.config().sample_rate;
        device.update_buffer(buffer, self.format, PcmData::I16(&self.scratch), rate)
    }
}

fn sample_format(data: &SampleData) -> PcmFormat {
    match data {
        SampleData::Mono8(_) => PcmFormat::Mono8,
        SampleData::Mono16(_) => PcmFormat::Mono16,
        SampleData::Stereo8(_, _) => PcmFormat::Stereo8,
        SampleData::Stereo16(_, _) => PcmFormat::Stereo16,
    }
}

/// A one-shot sample uploaded in its own bit depth and channel count.
///
/// A sample whose loop starts after frame 0 is split into an intro buffer
/// and a loop body; the body only starts looping once the intro is gone
/// from the voice queue.
pub struct SoundStream {
    buffers: ArrayVec<BufferHandle, 2>,
    looping: bool,
}

impl SoundStream {
    /// Upload `sample` into one or two static buffers.
    pub fn new<D: AudioDevice + ?Sized>(device: &mut D, sample: &Sample) -> Result<Self, DeviceError> {
        let format = sample_format(&sample.data);
        let rate = sample.sample_rate;
        let looping = sample.has_loop();
        let loop_start = sample.loop_start as usize;
        let loop_end = sample.loop_end as usize;

        let ranges: ArrayVec<core::ops::Range<usize>, 2> = if looping && loop_start > 0 {
            [0..loop_start, loop_start..loop_end].into_iter().collect()
        } else if looping {
            [0..loop_end].into_iter().collect()
        } else {
            [0..sample.len()].into_iter().collect()
        };

        let mut buffers = ArrayVec::new();
        for range in ranges {
            let handle = device.create_buffer()?;
            let bytes = sample.data.to_pcm_bytes(range);
            device.update_buffer(handle, format, PcmData::Bytes(&bytes), rate)?;
            buffers.push(handle);
        }
        Ok(Self { buffers, looping })
    }

    pub fn buffers(&self) -> &[BufferHandle] {
        &self.buffers
    }

    /// True when the sample loops.
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// True when the loop flag must be set later, once the intro has played.
    pub fn loops_after_intro(&self) -> bool {
        self.looping && self.buffers.len() == 2
    }

    /// Start playback on `voice`.
    pub fn start<D: AudioDevice + ?Sized>(
        &self,
        device: &mut D,
        voice: usize,
        pitch: f32,
        volume: f32,
    ) -> Result<(), DeviceError> {
        let single_loop = self.looping && self.buffers.len() == 1;
        device.play_buffer(voice, self.buffers[0], pitch, volume, single_loop)?;
        if let Some(&body) = self.buffers.get(1) {
            device.queue_buffer(voice, body, false)?;
        }
        Ok(())
    }

    /// Free the buffers. The voice must no longer hold them.
    pub fn release<D: AudioDevice + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        for buffer in self.buffers {
            device.delete_buffer(buffer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_audio::SoftwareDevice;
    use ms_engine::{Frame, MixerConfig};
    use ms_ir::{Key, Note, OrderEntry, Pattern, Song};
    use std::sync::Arc;

    const RATE: u32 = 8000;

    fn tone_player() -> Player {
        let mut song = Song::with_channels("tone", 1);
        let mut sample = Sample::new("dc");
        sample.data = SampleData::Mono16(vec![8000; 64]);
        sample.looping = true;
        sample.loop_end = 64;
        sample.sample_rate = RATE;
        song.samples.push(sample);
        let mut pattern = Pattern::new(64, 1);
        *pattern.note_mut(0, 0) = Note::pitch(Key::A, 4, 64).with_sample(0);
        song.patterns.push(pattern);
        song.order.push(OrderEntry::Pattern(0));
        let config = MixerConfig {
            sample_rate: RATE,
            channels: 1,
            interpolate: false,
            headroom: 1.0,
        };
        Player::new(Arc::new(song), config).unwrap()
    }

    fn stream_config(buffers: usize) -> StreamConfig {
        StreamConfig {
            buffers,
            buffer_frames: 16,
        }
    }

    #[test]
    fn start_prefills_and_queues_every_buffer() {
        let mut device = SoftwareDevice::new(2, RATE);
        let mut stream = ModuleStream::new(&mut device, tone_player(), &stream_config(3)).unwrap();
        assert_eq!(device.buffer_count(), 3);
        assert!(!device.is_playing(1));
        stream.start(&mut device, 1, 1.0).unwrap();
        assert_eq!(device.queued_count(1), 3);
        assert!(device.is_playing(1));

        let mut out = vec![Frame::silence(); 48];
        device.render(&mut out);
        assert!(out.iter().all(|f| f.left == 8000));
    }

    #[test]
    fn finished_buffer_is_refilled_and_requeued() {
        let mut device = SoftwareDevice::new(1, RATE);
        let mut stream = ModuleStream::new(&mut device, tone_player(), &stream_config(2)).unwrap();
        stream.start(&mut device, 0, 1.0).unwrap();
        let first = stream.buffers()[0];

        let mut out = vec![Frame::silence(); 20];
        device.render(&mut out);
        assert_eq!(device.processed_count(0), 1);

        stream.on_buffer_finished(&mut device).unwrap();
        assert_eq!(device.processed_count(0), 0);
        assert_eq!(device.queued_count(0), 2);
        assert_eq!(stream.current, 1);

        // the refilled buffer plays after the second one
        let mut out = vec![Frame::silence(); 28];
        device.render(&mut out);
        assert!(out.iter().all(|f| f.left == 8000));
        assert_eq!(device.unqueue_processed(0), Some(stream.buffers()[1]));
        assert_ne!(stream.buffers()[1], first);
    }

    #[test]
    fn underrun_restarts_voice() {
        let mut device = SoftwareDevice::new(1, RATE);
        let mut stream = ModuleStream::new(&mut device, tone_player(), &stream_config(2)).unwrap();
        stream.start(&mut device, 0, 1.0).unwrap();
        let mut out = vec![Frame::silence(); 40];
        device.render(&mut out);
        assert!(!device.is_playing(0));

        stream.on_buffer_finished(&mut device).unwrap();
        assert!(device.is_playing(0));
    }

    #[test]
    fn release_frees_buffers() {
        let mut device = SoftwareDevice::new(1, RATE);
        let mut stream = ModuleStream::new(&mut device, tone_player(), &stream_config(2)).unwrap();
        stream.start(&mut device, 0, 1.0).unwrap();
        stream.release(&mut device).unwrap();
        assert_eq!(device.buffer_count(), 0);
        assert!(!device.is_playing(0));
    }

    fn looped_sample(loop_start: u32) -> Sample {
        let mut sample = Sample::new("loop");
        sample.data = SampleData::Mono16((0..8).map(|v| v * 10).collect());
        sample.looping = true;
        sample.loop_start = loop_start;
        sample.loop_end = 6;
        sample.sample_rate = RATE;
        sample
    }

    #[test]
    fn sound_with_intro_splits_at_loop_start() {
        let mut device = SoftwareDevice::new(1, RATE);
        let sound = SoundStream::new(&mut device, &looped_sample(2)).unwrap();
        assert_eq!(sound.buffers().len(), 2);
        assert!(sound.loops_after_intro());
        sound.start(&mut device, 0, 1.0, 1.0).unwrap();

        let mut out = vec![Frame::silence(); 6];
        device.render(&mut out);
        let left: Vec<i16> = out.iter().map(|f| f.left).collect();
        assert_eq!(left, vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(device.unqueue_processed(0), Some(sound.buffers()[0]));
        assert_eq!(device.queued_count(0), 1);
        device.set_looping(0, true).unwrap();

        let mut out = vec![Frame::silence(); 4];
        device.render(&mut out);
        let left: Vec<i16> = out.iter().map(|f| f.left).collect();
        assert_eq!(left, vec![20, 30, 40, 50]);
    }

    #[test]
    fn sound_looping_from_zero_uses_one_buffer() {
        let mut device = SoftwareDevice::new(1, RATE);
        let sound = SoundStream::new(&mut device, &looped_sample(0)).unwrap();
        assert_eq!(sound.buffers().len(), 1);
        assert!(!sound.loops_after_intro());
        sound.start(&mut device, 0, 1.0, 1.0).unwrap();
        let mut out = vec![Frame::silence(); 8];
        device.render(&mut out);
        assert_eq!(out[6].left, 0);
        assert_eq!(out[7].left, 10);
    }

    #[test]
    fn one_shot_keeps_bit_depth() {
        let mut device = SoftwareDevice::new(1, RATE);
        let mut sample = Sample::new("hit");
        sample.data = SampleData::Mono8(vec![64, -64]);
        sample.sample_rate = RATE;
        let sound = SoundStream::new(&mut device, &sample).unwrap();
        assert!(!sound.looping());
        sound.start(&mut device, 0, 1.0, 1.0).unwrap();
        let mut out = vec![Frame::silence(); 3];
        device.render(&mut out);
        assert_eq!(out[0].left, 64 << 8);
        assert_eq!(out[1].left, -64 << 8);
        assert!(!device.is_playing(0));
    }
}
