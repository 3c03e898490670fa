//! modsound: a software audio engine with S3M module playback.
//!
//! The layers live in their own crates and are re-exported here:
//!
//! - [`ir`]: the song data model
//! - [`formats`]: the S3M parser
//! - [`engine`]: the playback clock, effects and mixer
//! - [`audio`]: the device surface, software device and voice allocator
//!
//! The top-level items come from `ms-master`: the [`AudioContext`] that owns
//! a device, the module and sound streams, and the engine configuration.

pub use ms_audio as audio;
pub use ms_engine as engine;
pub use ms_formats as formats;
pub use ms_ir as ir;

pub use ms_master::*;
