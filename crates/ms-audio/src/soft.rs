//! Deterministic in-memory audio device.

use heapless::Deque;
use ms_engine::frequency::{rate_to_increment, FRAC_BITS};
use ms_engine::Frame;
use slotmap::SlotMap;

use crate::device::{AudioDevice, BufferHandle, DeviceError, PcmData, PcmFormat};

/// Buffers a voice can hold, processed ones included.
pub const QUEUE_CAPACITY: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VoiceState {
    Stopped,
    Playing,
    Paused,
}

struct DeviceBuffer {
    format: PcmFormat,
    rate: u32,
    /// Interleaved samples widened to 16 bits
    data: Vec<i16>,
}

impl DeviceBuffer {
    fn frames(&self) -> usize {
        self.data.len() / self.format.channels() as usize
    }
}

struct Voice {
    state: VoiceState,
    queue: Deque<BufferHandle, QUEUE_CAPACITY>,
    processed: Deque<BufferHandle, QUEUE_CAPACITY>,
    /// 16.16 frame position in the front buffer
    position: u64,
    pitch: f32,
    volume: f32,
    looping: bool,
}

impl Voice {
    fn new() -> Self {
        Self {
            state: VoiceState::Stopped,
            queue: Deque::new(),
            processed: Deque::new(),
            position: 0,
            pitch: 1.0,
            volume: 1.0,
            looping: false,
        }
    }

    fn holds(&self, buffer: BufferHandle) -> bool {
        self.queue.iter().chain(self.processed.iter()).any(|&b| b == buffer)
    }

    fn reset(&mut self) {
        self.state = VoiceState::Stopped;
        self.queue.clear();
        self.processed.clear();
        self.position = 0;
    }
}

/// Software mixer implementing [`AudioDevice`].
///
/// Nothing plays until [`SoftwareDevice::render`] is called; each call mixes
/// every playing voice into the given frames.
pub struct SoftwareDevice {
    buffers: SlotMap<BufferHandle, DeviceBuffer>,
    voices: Vec<Voice>,
    output_rate: u32,
}

impl SoftwareDevice {
    pub fn new(voice_count: usize, output_rate: u32) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            voices: (0..voice_count).map(|_| Voice::new()).collect(),
            output_rate,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Mix all playing voices into `out`, which is cleared first.
    pub fn render(&mut self, out: &mut [Frame]) {
        out.fill(Frame::silence());
        for voice in self.voices.iter_mut() {
            render_voice(voice, &self.buffers, self.output_rate, out);
        }
    }

    fn voice(&self, voice: usize) -> Option<&Voice> {
        self.voices.get(voice)
    }

    fn voice_mut(&mut self, voice: usize) -> Result<&mut Voice, DeviceError> {
        self.voices.get_mut(voice).ok_or(DeviceError::InvalidVoice(voice))
    }

    fn in_use(&self, buffer: BufferHandle) -> bool {
        self.voices.iter().any(|v| v.holds(buffer))
    }
}

fn render_voice(
    voice: &mut Voice,
    buffers: &SlotMap<BufferHandle, DeviceBuffer>,
    output_rate: u32,
    out: &mut [Frame],
) {
    for frame in out.iter_mut() {
        if voice.state != VoiceState::Playing {
            return;
        }

        let mut hops = 0;
        let buffer = loop {
            let Some(&handle) = voice.queue.front() else {
                voice.state = VoiceState::Stopped;
                voice.position = 0;
                return;
            };
            let Some(buffer) = buffers.get(handle) else {
                voice.queue.pop_front();
                continue;
            };
            let frames = buffer.frames() as u64;
            if voice.position >> FRAC_BITS < frames {
                break buffer;
            }

            // Empty looping queues would spin forever
            hops += 1;
            if hops > QUEUE_CAPACITY {
                voice.state = VoiceState::Stopped;
                return;
            }
            voice.position -= frames << FRAC_BITS;
            voice.queue.pop_front();
            let _ = if voice.looping {
                voice.queue.push_back(handle)
            } else {
                voice.processed.push_back(handle)
            };
        };

        let index = (voice.position >> FRAC_BITS) as usize;
        let value = Frame::from_interleaved(&buffer.data, buffer.format.channels(), index);
        frame.mix(value.scaled(voice.volume));

        let increment = rate_to_increment(buffer.rate as f32 * voice.pitch, output_rate);
        voice.position += increment as u64;
    }
}

fn widen(format: PcmFormat, data: PcmData<'_>) -> Result<Vec<i16>, DeviceError> {
    let channels = format.channels() as usize;
    let samples = match (format.bits(), data) {
        (16, PcmData::I16(samples)) => samples.to_vec(),
        (16, PcmData::Bytes(bytes)) => {
            if bytes.len() % 2 != 0 {
                return Err(DeviceError::InvalidLength { format, len: bytes.len() });
            }
            bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect()
        }
        (_, PcmData::Bytes(bytes)) => bytes.iter().map(|&b| ((b ^ 0x80) as i8 as i16) << 8).collect(),
        (_, PcmData::I16(_)) => return Err(DeviceError::FormatMismatch(format)),
    };
    if samples.len() % channels != 0 {
        return Err(DeviceError::InvalidLength { format, len: samples.len() });
    }
    Ok(samples)
}

impl AudioDevice for SoftwareDevice {
    fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn create_buffer(&mut self) -> Result<BufferHandle, DeviceError> {
        Ok(self.buffers.insert(DeviceBuffer {
            format: PcmFormat::Mono16,
            rate: self.output_rate,
            data: Vec::new(),
        }))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError> {
        if self.in_use(buffer) {
            return Err(DeviceError::BufferInUse);
        }
        self.buffers.remove(buffer).map(|_| ()).ok_or(DeviceError::InvalidBuffer)
    }

    fn update_buffer(
        &mut self,
        buffer: BufferHandle,
        format: PcmFormat,
        data: PcmData<'_>,
        rate: u32,
    ) -> Result<(), DeviceError> {
        if rate == 0 {
            return Err(DeviceError::InvalidRate);
        }
        if self.in_use(buffer) {
            return Err(DeviceError::BufferInUse);
        }
        let samples = widen(format, data)?;
        let slot = self.buffers.get_mut(buffer).ok_or(DeviceError::InvalidBuffer)?;
        slot.format = format;
        slot.rate = rate;
        slot.data = samples;
        Ok(())
    }

    fn play_buffer(
        &mut self,
        voice: usize,
        buffer: BufferHandle,
        pitch: f32,
        volume: f32,
        looping: bool,
    ) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(buffer) {
            return Err(DeviceError::InvalidBuffer);
        }
        let v = self.voice_mut(voice)?;
        v.reset();
        let _ = v.queue.push_back(buffer);
        v.pitch = pitch;
        v.volume = volume;
        v.looping = looping;
        v.state = VoiceState::Playing;
        Ok(())
    }

    fn queue_buffer(
        &mut self,
        voice: usize,
        buffer: BufferHandle,
        looping: bool,
    ) -> Result<(), DeviceError> {
        if !self.buffers.contains_key(buffer) {
            return Err(DeviceError::InvalidBuffer);
        }
        let v = self.voice_mut(voice)?;
        if v.queue.len() + v.processed.len() >= QUEUE_CAPACITY {
            return Err(DeviceError::QueueFull(voice));
        }
        let _ = v.queue.push_back(buffer);
        v.looping = looping;
        Ok(())
    }

    fn set_looping(&mut self, voice: usize, looping: bool) -> Result<(), DeviceError> {
        self.voice_mut(voice)?.looping = looping;
        Ok(())
    }

    fn is_playing(&self, voice: usize) -> bool {
        self.voice(voice).is_some_and(|v| v.state == VoiceState::Playing)
    }

    fn processed_count(&self, voice: usize) -> usize {
        self.voice(voice).map_or(0, |v| v.processed.len())
    }

    fn queued_count(&self, voice: usize) -> usize {
        self.voice(voice).map_or(0, |v| v.queue.len() + v.processed.len())
    }

    fn unqueue_processed(&mut self, voice: usize) -> Option<BufferHandle> {
        self.voices.get_mut(voice)?.processed.pop_front()
    }

    fn stop(&mut self, voice: usize) -> Result<(), DeviceError> {
        self.voice_mut(voice)?.reset();
        Ok(())
    }

    fn pause(&mut self, voice: usize) -> Result<(), DeviceError> {
        let v = self.voice_mut(voice)?;
        if v.state == VoiceState::Playing {
            v.state = VoiceState::Paused;
        }
        Ok(())
    }

    fn resume(&mut self, voice: usize) -> Result<(), DeviceError> {
        let v = self.voice_mut(voice)?;
        if v.state == VoiceState::Paused || !v.queue.is_empty() {
            v.state = VoiceState::Playing;
        }
        Ok(())
    }
}
