//! Hardware voice allocation with persistence and stealing.

use crate::device::{AudioDevice, DeviceError};

/// Error type for voice allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("voice range {min}..{max} is empty or exceeds the device")]
    InvalidRange { min: usize, max: usize },
    #[error("every voice in {min}..{max} is persistent")]
    Exhausted { min: usize, max: usize },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Bookkeeping for one hardware voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoiceSlot {
    /// Protected from stealing while it plays
    pub persistent: bool,
    /// Turn the voice loop flag on once its queue runs short
    pub loop_next: bool,
}

/// Hands out voices of a device in round-robin order.
///
/// A voice is free when the device reports it is not playing. When none is
/// free, the first non-persistent voice in the range is stopped and reused.
#[derive(Clone, Debug)]
pub struct ChannelAllocator {
    slots: Vec<VoiceSlot>,
    last: usize,
}

impl ChannelAllocator {
    pub fn new(voice_count: usize) -> Self {
        Self {
            slots: vec![VoiceSlot::default(); voice_count],
            last: 0,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, voice: usize) -> Option<&VoiceSlot> {
        self.slots.get(voice)
    }

    pub fn slot_mut(&mut self, voice: usize) -> Option<&mut VoiceSlot> {
        self.slots.get_mut(voice)
    }

    /// Acquire a voice in `[min, max)`.
    ///
    /// Searches from the voice after the last one handed out. The returned
    /// voice has its flags cleared.
    pub fn acquire<D: AudioDevice + ?Sized>(
        &mut self,
        device: &mut D,
        min: usize,
        max: usize,
    ) -> Result<usize, AllocError> {
        if min >= max || max > self.slots.len() || max > device.voice_count() {
            return Err(AllocError::InvalidRange { min, max });
        }
        let span = max - min;
        let next = |ch: usize| if ch + 1 >= max || ch + 1 < min { min } else { ch + 1 };

        let mut ch = self.last;
        for _ in 0..span {
            ch = next(ch);
            if !self.is_playing(device, ch) {
                return Ok(self.claim(ch));
            }
        }

        for _ in 0..span {
            ch = next(ch);
            if !self.slots[ch].persistent {
                log::debug!("stealing voice {ch}");
                device.stop(ch)?;
                return Ok(self.claim(ch));
            }
        }

        Err(AllocError::Exhausted { min, max })
    }

    fn claim(&mut self, voice: usize) -> usize {
        self.slots[voice] = VoiceSlot::default();
        self.last = voice;
        voice
    }

    /// Whether `voice` is playing. A stopped voice loses its persistence.
    pub fn is_playing<D: AudioDevice + ?Sized>(&mut self, device: &D, voice: usize) -> bool {
        let playing = device.is_playing(voice);
        if !playing {
            if let Some(slot) = self.slots.get_mut(voice) {
                slot.persistent = false;
            }
        }
        playing
    }

    pub fn set_persistent(&mut self, voice: usize, persistent: bool) {
        if let Some(slot) = self.slots.get_mut(voice) {
            slot.persistent = persistent;
        }
    }

    pub fn is_persistent(&self, voice: usize) -> bool {
        self.slots.get(voice).is_some_and(|s| s.persistent)
    }

    /// Stop `voice` and clear its flags.
    pub fn stop<D: AudioDevice + ?Sized>(
        &mut self,
        device: &mut D,
        voice: usize,
    ) -> Result<(), AllocError> {
        device.stop(voice)?;
        if let Some(slot) = self.slots.get_mut(voice) {
            *slot = VoiceSlot::default();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferHandle, PcmData, PcmFormat};
    use crate::soft::SoftwareDevice;

    fn busy_device(voices: usize) -> (SoftwareDevice, BufferHandle) {
        let mut device = SoftwareDevice::new(voices, 8000);
        let h = device.create_buffer().unwrap();
        device
            .update_buffer(h, PcmFormat::Mono16, PcmData::I16(&[0; 16]), 8000)
            .unwrap();
        (device, h)
    }

    fn occupy(device: &mut SoftwareDevice, h: BufferHandle, voice: usize) {
        device.play_buffer(voice, h, 1.0, 1.0, true).unwrap();
    }

    #[test]
    fn round_robin_over_free_voices() {
        let (mut device, h) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        let mut got = Vec::new();
        for _ in 0..4 {
            let v = alloc.acquire(&mut device, 0, 4).unwrap();
            occupy(&mut device, h, v);
            got.push(v);
        }
        assert_eq!(got, vec![1, 2, 3, 0]);
    }

    #[test]
    fn steals_first_non_persistent() {
        let (mut device, h) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        for v in 0..4 {
            occupy(&mut device, h, v);
        }
        alloc.set_persistent(1, true);

        let v = alloc.acquire(&mut device, 0, 4).unwrap();
        assert_eq!(v, 2);
        assert!(!device.is_playing(2));

        // search continues after the stolen voice
        occupy(&mut device, h, 2);
        assert_eq!(alloc.acquire(&mut device, 0, 4).unwrap(), 3);
    }

    #[test]
    fn all_persistent_is_exhausted() {
        let (mut device, h) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        for v in 0..4 {
            occupy(&mut device, h, v);
            alloc.set_persistent(v, true);
        }
        assert_eq!(
            alloc.acquire(&mut device, 0, 4),
            Err(AllocError::Exhausted { min: 0, max: 4 })
        );
        for v in 0..4 {
            assert!(device.is_playing(v));
        }
    }

    #[test]
    fn stopped_voice_loses_persistence() {
        let (mut device, h) = busy_device(2);
        let mut alloc = ChannelAllocator::new(2);
        occupy(&mut device, h, 0);
        alloc.set_persistent(0, true);
        assert!(alloc.is_playing(&device, 0));
        assert!(alloc.is_persistent(0));

        device.stop(0).unwrap();
        assert!(!alloc.is_playing(&device, 0));
        assert!(!alloc.is_persistent(0));
    }

    #[test]
    fn respects_sub_range() {
        let (mut device, h) = busy_device(8);
        let mut alloc = ChannelAllocator::new(8);
        for _ in 0..6 {
            let v = alloc.acquire(&mut device, 4, 8).unwrap();
            assert!((4..8).contains(&v));
            occupy(&mut device, h, v);
        }
    }

    #[test]
    fn rejects_bad_ranges() {
        let (mut device, _) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        assert_eq!(
            alloc.acquire(&mut device, 2, 2),
            Err(AllocError::InvalidRange { min: 2, max: 2 })
        );
        assert_eq!(
            alloc.acquire(&mut device, 0, 5),
            Err(AllocError::InvalidRange { min: 0, max: 5 })
        );
    }

    #[test]
    fn single_voice_pool_reuses_free_voice() {
        let (mut device, _) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        assert_eq!(alloc.acquire(&mut device, 3, 4).unwrap(), 3);
        assert_eq!(alloc.acquire(&mut device, 3, 4).unwrap(), 3);
    }

    #[test]
    fn single_voice_pool_steals_or_exhausts() {
        let (mut device, h) = busy_device(4);
        let mut alloc = ChannelAllocator::new(4);
        occupy(&mut device, h, 0);
        assert_eq!(alloc.acquire(&mut device, 0, 1).unwrap(), 0);
        assert!(!device.is_playing(0));

        occupy(&mut device, h, 0);
        alloc.set_persistent(0, true);
        assert_eq!(
            alloc.acquire(&mut device, 0, 1),
            Err(AllocError::Exhausted { min: 0, max: 1 })
        );
    }
}
