//! Pitch and resample-ratio conversion.
//!
//! Playback positions and increments are 16.16 fixed-point frame counts:
//! the high bits index the sample frame, the low 16 bits are the fraction.

/// Fractional bits of positions and increments.
pub const FRAC_BITS: u32 = 16;

/// Mask of the fractional part.
pub const FRAC_MASK: u64 = (1 << FRAC_BITS) - 1;

/// PAL Amiga clock used by the portamento slide step.
pub const AMIGA_CLOCK: f32 = 3_546_895.0;

/// Octave whose A plays a sample at its own rate.
const REFERENCE_OCTAVE: i32 = 4;

/// Semitone index of A, the concert-pitch reference.
const REFERENCE_SEMITONE: i32 = 9;

/// Rate multiplier for a semitone (0 = C) in an octave, relative to A-4.
///
/// `2^(octave - 4) * 2^((semitone - 9) / 12)`. The octave factor is applied
/// as an exact power of two so each octave doubles the result exactly.
pub fn pitch_multiplier(semitone: u8, octave: u8) -> f32 {
    let within_octave = libm::exp2f((semitone as i32 - REFERENCE_SEMITONE) as f32 / 12.0);
    libm::ldexpf(within_octave, octave as i32 - REFERENCE_OCTAVE)
}

/// Convert a playback rate in Hz to a 16.16 increment at `output_rate`.
///
/// Non-positive rates and a zero output rate give a zero increment.
pub fn rate_to_increment(rate: f32, output_rate: u32) -> u32 {
    if rate <= 0.0 || output_rate == 0 {
        return 0;
    }
    let inc = rate as f64 * (1u64 << FRAC_BITS) as f64 / output_rate as f64;
    if inc >= u32::MAX as f64 {
        u32::MAX
    } else {
        inc as u32
    }
}

/// Per-tick rate change of a portamento with parameter `param` at `rate` Hz.
pub fn portamento_step(rate: f32, param: u8) -> f32 {
    if rate <= 0.0 {
        return 0.0;
    }
    AMIGA_CLOCK / rate * param as f32
}

/// Output frames per tick: `2.5 / tempo` seconds, i.e. `rate * 5 / (tempo * 2)`.
pub fn samples_per_tick(output_rate: u32, tempo: u8) -> u32 {
    if tempo == 0 {
        return 0;
    }
    let ticks = output_rate as u64 * 5 / (tempo as u64 * 2);
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
