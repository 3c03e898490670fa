//! The audio context: device ownership, loaded assets and per-frame update.

use std::collections::VecDeque;
use std::sync::Arc;

use ms_audio::{AllocError, AudioDevice, ChannelAllocator, DeviceError};
use ms_engine::{PlaybackPosition, Player, PlayerError};
use ms_formats::FormatError;
use ms_ir::{Sample, Song};
use slotmap::{new_key_type, SlotMap};

use crate::config::{ConfigError, EngineConfig};
use crate::stream::{ModuleStream, SoundStream};
use crate::wav::wav_bytes;

new_key_type! {
    /// Handle of a loaded module.
    pub struct ModuleId;
    /// Handle of an uploaded sound.
    pub struct SoundId;
}

/// Error type for context operations.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("config needs {configured} voices, device has {device}")]
    VoiceCount { configured: usize, device: usize },
    #[error("unknown module handle")]
    UnknownModule,
    #[error("unknown sound handle")]
    UnknownSound,
    #[error("sample has no data")]
    EmptySample,
}

/// Notifications produced by [`AudioContext::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEvent {
    /// A buffer on `voice` played to its end
    BufferFinished { voice: usize },
}

/// Owns an [`AudioDevice`] and everything playing on it.
///
/// Call [`update`](Self::update) once per host frame. It turns processed
/// buffers into [`AudioEvent::BufferFinished`] events, services them in
/// order (module streams refill, sounds drop their finished intro) and then
/// hands them to the host through [`drain_events`](Self::drain_events).
pub struct AudioContext<D: AudioDevice> {
    device: D,
    config: EngineConfig,
    allocator: ChannelAllocator,
    modules: SlotMap<ModuleId, Arc<Song>>,
    sounds: SlotMap<SoundId, SoundStream>,
    streams: Vec<ModuleStream>,
    /// Sound playing on each voice
    voice_sounds: Vec<Option<SoundId>>,
    pending: VecDeque<AudioEvent>,
    outbox: Vec<AudioEvent>,
}

impl<D: AudioDevice> AudioContext<D> {
    pub fn new(device: D, config: EngineConfig) -> Result<Self, ContextError> {
        config.validate()?;
        if config.voice_count > device.voice_count() {
            return Err(ContextError::VoiceCount {
                configured: config.voice_count,
                device: device.voice_count(),
            });
        }
        log::debug!(
            "audio context: {} voices at {} Hz",
            config.voice_count,
            config.sample_rate
        );
        Ok(Self {
            allocator: ChannelAllocator::new(config.voice_count),
            voice_sounds: vec![None; config.voice_count],
            device,
            config,
            modules: SlotMap::with_key(),
            sounds: SlotMap::with_key(),
            streams: Vec::new(),
            pending: VecDeque::new(),
            outbox: Vec::new(),
        })
    }

    /// Stop every voice, free all device buffers and return the device.
    pub fn shutdown(mut self) -> Result<D, ContextError> {
        for voice in 0..self.config.voice_count {
            self.allocator.stop(&mut self.device, voice)?;
        }
        for stream in self.streams.drain(..) {
            stream.release(&mut self.device)?;
        }
        for (_, sound) in self.sounds.drain() {
            sound.release(&mut self.device)?;
        }
        Ok(self.device)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn allocator(&self) -> &ChannelAllocator {
        &self.allocator
    }

    /// Parse an S3M module and keep it for playback.
    pub fn load_module(&mut self, bytes: &[u8]) -> Result<ModuleId, ContextError> {
        let song = ms_formats::load_s3m(bytes)?;
        Ok(self.add_module(song))
    }

    pub fn add_module(&mut self, song: Song) -> ModuleId {
        log::debug!(
            "loaded module \"{}\": {} orders, {} patterns, {} samples",
            song.title,
            song.order.len(),
            song.patterns.len(),
            song.samples.len()
        );
        self.modules.insert(Arc::new(song))
    }

    pub fn module(&self, id: ModuleId) -> Option<&Arc<Song>> {
        self.modules.get(id)
    }

    /// Forget a module. Streams already playing it keep their copy.
    pub fn unload_module(&mut self, id: ModuleId) -> Result<(), ContextError> {
        self.modules.remove(id).map(|_| ()).ok_or(ContextError::UnknownModule)
    }

    /// Upload a sample as a one-shot sound.
    pub fn load_sound(&mut self, sample: &Sample) -> Result<SoundId, ContextError> {
        if sample.is_empty() {
            return Err(ContextError::EmptySample);
        }
        let sound = SoundStream::new(&mut self.device, sample)?;
        Ok(self.sounds.insert(sound))
    }

    /// Stop every voice playing the sound and free its buffers.
    pub fn unload_sound(&mut self, id: SoundId) -> Result<(), ContextError> {
        if !self.sounds.contains_key(id) {
            return Err(ContextError::UnknownSound);
        }
        for voice in 0..self.voice_sounds.len() {
            if self.voice_sounds[voice] == Some(id) {
                self.stop(voice)?;
            }
        }
        if let Some(sound) = self.sounds.remove(id) {
            sound.release(&mut self.device)?;
        }
        Ok(())
    }

    /// Start streaming a module on a music voice. Returns the voice.
    ///
    /// Music voices are persistent until stopped. The stream is rendered
    /// before a voice is acquired, so a failure leaves every voice as it was.
    pub fn play_module(&mut self, id: ModuleId, volume: f32) -> Result<usize, ContextError> {
        let song = self.modules.get(id).ok_or(ContextError::UnknownModule)?.clone();
        let player = Player::new(song, self.config.mixer())?;
        let mut stream = ModuleStream::new(&mut self.device, player, &self.config.stream)?;

        let range = self.config.music_voices;
        let voice = match self.allocator.acquire(&mut self.device, range.min, range.max) {
            Ok(voice) => voice,
            Err(e) => {
                stream.release(&mut self.device)?;
                return Err(e.into());
            }
        };
        self.evict(voice)?;

        if let Err(e) = stream.start(&mut self.device, voice, volume) {
            stream.release(&mut self.device)?;
            return Err(e.into());
        }
        self.allocator.set_persistent(voice, true);
        self.streams.push(stream);
        Ok(voice)
    }

    /// Play an uploaded sound on a sound voice. Returns the voice.
    pub fn play_sound(
        &mut self,
        id: SoundId,
        pitch: f32,
        volume: f32,
        persistent: bool,
    ) -> Result<usize, ContextError> {
        if !self.sounds.contains_key(id) {
            return Err(ContextError::UnknownSound);
        }
        let range = self.config.sound_voices;
        let voice = self.allocator.acquire(&mut self.device, range.min, range.max)?;
        self.evict(voice)?;

        let sound = self.sounds.get(id).ok_or(ContextError::UnknownSound)?;
        sound.start(&mut self.device, voice, pitch, volume)?;
        let loops_after_intro = sound.loops_after_intro();
        if let Some(slot) = self.allocator.slot_mut(voice) {
            slot.persistent = persistent;
            slot.loop_next = loops_after_intro;
        }
        self.voice_sounds[voice] = Some(id);
        Ok(voice)
    }

    /// Poll the device, service finished buffers and arm pending loops.
    pub fn update(&mut self) -> Result<(), ContextError> {
        for voice in 0..self.config.voice_count {
            for _ in 0..self.device.processed_count(voice) {
                self.pending.push_back(AudioEvent::BufferFinished { voice });
            }
        }

        while let Some(event) = self.pending.pop_front() {
            match event {
                AudioEvent::BufferFinished { voice } => {
                    let stream = self.streams.iter_mut().find(|s| s.voice() == Some(voice));
                    if let Some(stream) = stream {
                        stream.on_buffer_finished(&mut self.device)?;
                    } else {
                        self.device.unqueue_processed(voice);
                    }
                }
            }
            self.outbox.push(event);
        }

        for voice in 0..self.config.voice_count {
            let arm = self
                .allocator
                .slot(voice)
                .is_some_and(|s| s.loop_next && self.device.queued_count(voice) < 2);
            if arm {
                self.device.set_looping(voice, true)?;
                if let Some(slot) = self.allocator.slot_mut(voice) {
                    slot.loop_next = false;
                }
            }
        }
        Ok(())
    }

    /// Take the events produced by previous updates, oldest first.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, AudioEvent> {
        self.outbox.drain(..)
    }

    /// Whether `voice` is playing.
    ///
    /// Not a pure query: a voice found stopped loses its persistence.
    pub fn is_playing(&mut self, voice: usize) -> bool {
        self.allocator.is_playing(&self.device, voice)
    }

    pub fn set_persistent(&mut self, voice: usize, persistent: bool) {
        self.allocator.set_persistent(voice, persistent);
    }

    /// Stop a voice immediately, dropping its queued buffers. A module
    /// stream on the voice is released.
    pub fn stop(&mut self, voice: usize) -> Result<(), ContextError> {
        self.evict(voice)?;
        self.allocator.stop(&mut self.device, voice)?;
        Ok(())
    }

    pub fn pause(&mut self, voice: usize) -> Result<(), ContextError> {
        Ok(self.device.pause(voice)?)
    }

    pub fn resume(&mut self, voice: usize) -> Result<(), ContextError> {
        Ok(self.device.resume(voice)?)
    }

    /// Playback position of the module streaming on `voice`.
    pub fn module_position(&self, voice: usize) -> Option<PlaybackPosition> {
        self.streams
            .iter()
            .find(|s| s.voice() == Some(voice))
            .map(|s| s.player().position())
    }

    /// Restart the module streaming on `voice` at `order`. Buffers already
    /// queued still play out.
    pub fn seek_module(&mut self, voice: usize, order: usize) -> bool {
        match self.stream_on_mut(voice) {
            Some(stream) => {
                stream.player_mut().seek(order);
                true
            }
            None => false,
        }
    }

    /// Render `frames` output frames of a module to WAV bytes, without
    /// touching the device.
    pub fn render_module_to_wav(&self, id: ModuleId, frames: usize) -> Result<Vec<u8>, ContextError> {
        let song = self.modules.get(id).ok_or(ContextError::UnknownModule)?.clone();
        let mixer = self.config.mixer();
        let mut player = Player::new(song, mixer)?;
        let mut samples = vec![0i16; frames * mixer.channels as usize];
        player.render(&mut samples);
        Ok(wav_bytes(&samples, mixer.channels, mixer.sample_rate))
    }

    fn stream_on_mut(&mut self, voice: usize) -> Option<&mut ModuleStream> {
        self.streams.iter_mut().find(|s| s.voice() == Some(voice))
    }

    /// Release whatever this context was playing on `voice`.
    fn evict(&mut self, voice: usize) -> Result<(), ContextError> {
        if let Some(i) = self.streams.iter().position(|s| s.voice() == Some(voice)) {
            let stream = self.streams.swap_remove(i);
            stream.release(&mut self.device)?;
        }
        if let Some(slot) = self.voice_sounds.get_mut(voice) {
            *slot = None;
        }
        Ok(())
    }
}
