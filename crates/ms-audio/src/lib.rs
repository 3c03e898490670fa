//! Audio device surface and voice allocation for the modsound engine.
//!
//! [`AudioDevice`] is the voice/buffer interface the stream controller
//! drives. [`SoftwareDevice`] implements it in memory; with the `cpal`
//! feature its output can be sent to the default sound card.

mod allocator;
#[cfg(feature = "cpal")]
mod cpal_output;
mod device;
mod soft;

pub use allocator::{AllocError, ChannelAllocator, VoiceSlot};
#[cfg(feature = "cpal")]
pub use cpal_output::CpalOutput;
pub use device::{AudioDevice, BufferHandle, DeviceError, PcmData, PcmFormat};
pub use soft::{SoftwareDevice, QUEUE_CAPACITY};
