//! Playback engine for the modsound S3M player.
//!
//! A [`Player`] walks a song's order list tick by tick, applies row and tick
//! effects to its channels and resamples them into interleaved 16-bit PCM.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod frame;
pub mod frequency;
mod mixer;
mod player;

pub use channel::MixerChannel;
pub use frame::Frame;
pub use mixer::{add_clamped, MixerConfig};
pub use player::{PlaybackPosition, Player, PlayerError};
