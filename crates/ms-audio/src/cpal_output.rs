//! Real-time output of a [`SoftwareDevice`] through cpal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ms_engine::Frame;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::DeviceError;
use crate::soft::SoftwareDevice;

/// Default output stream fed from a lock-free frame ring.
///
/// The audio thread only pops frames; the host thread renders the software
/// device and pushes them with [`CpalOutput::pump`].
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
    scratch: Vec<Frame>,
}

impl CpalOutput {
    /// Open the default output device with about 100 ms of buffering.
    pub fn new() -> Result<(Self, HeapCons<Frame>), DeviceError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The callback writes interleaved stereo pairs
        config.channels = 2;

        let buffer_size = config.sample_rate.0 as usize / 10;
        let rb = HeapRb::<Frame>::new(buffer_size);
        let (producer, consumer) = rb.split();

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
            scratch: Vec::with_capacity(buffer_size),
        };

        Ok((output, consumer))
    }

    /// Output rate to create the [`SoftwareDevice`] with.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), DeviceError> {
        let running = self.running.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    for chunk in data.chunks_mut(channels) {
                        let frame = consumer.try_pop().unwrap_or_default();
                        let left = frame.left as f32 / 32768.0;
                        let right = frame.right as f32 / 32768.0;
                        for (i, sample) in chunk.iter_mut().enumerate() {
                            *sample = match i {
                                0 => left,
                                1 => right,
                                _ => 0.0,
                            };
                        }
                    }
                },
                |err| log::error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        stream.play().map_err(|e| DeviceError::Backend(e.to_string()))?;
        self.running.store(true, Ordering::Relaxed);
        self.stream = Some(stream);

        Ok(())
    }

    /// Render as many frames as the ring has room for. Returns the count.
    pub fn pump(&mut self, device: &mut SoftwareDevice) -> usize {
        let free = self.producer.vacant_len();
        if free == 0 {
            return 0;
        }
        self.scratch.clear();
        self.scratch.resize(free, Frame::silence());
        device.render(&mut self.scratch);
        self.producer.push_slice(&self.scratch)
    }

    pub fn start(&mut self) -> Result<(), DeviceError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| DeviceError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| DeviceError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}
