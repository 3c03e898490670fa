//! Song data model for the modsound engine.
//!
//! The module parser emits these types and the playback engine consumes
//! them. Everything here is immutable once a song is loaded.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod pattern;
mod sample;
pub mod song;

pub use effects::Effect;
pub use pattern::{Key, Note, Pattern, VOLUME_KEEP, VOLUME_MAX};
pub use sample::{Sample, SampleData};
pub use song::{ChannelSettings, OrderEntry, Song, PAN_CENTER};
