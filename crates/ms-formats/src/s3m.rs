//! Scream Tracker 3 (S3M) format parser.
//!
//! Fixed-layout records (song header, instrument headers, pointer tables)
//! are decoded with `binrw`; the packed pattern rows are walked with a byte
//! cursor. All values are little-endian and all pointers are paragraph
//! indices (byte offset = pointer * 16).

use std::io::Cursor;

use binrw::BinRead;
use log::{debug, warn};
use ms_ir::{
    ChannelSettings, Effect, Key, Note, OrderEntry, Pattern, Sample, SampleData, Song,
    VOLUME_KEEP, VOLUME_MAX,
};

use crate::reader::ByteReader;
use crate::FormatError;

const HEADER_SIZE: usize = 96;
const INSTRUMENT_SIZE: usize = 80;
const EOF_MARKER: u8 = 0x1A;
const SONG_TAG: &[u8; 4] = b"SCRM";
const SAMPLE_TAG: &[u8; 4] = b"SCRS";
const ROWS_PER_PATTERN: u16 = 64;
const MAX_CHANNELS: usize = 32;
/// `default_pan` value announcing a pan table after the pointer tables.
const PAN_TABLE_PRESENT: u8 = 252;
/// Order values that are markers rather than pattern numbers.
const ORDER_MARKERS: [u8; 2] = [254, 255];

const INSTRUMENT_EMPTY: u8 = 0;
const INSTRUMENT_PCM: u8 = 1;

const SAMPLE_FLAG_LOOP: u8 = 1 << 0;
const SAMPLE_FLAG_STEREO: u8 = 1 << 1;
const SAMPLE_FLAG_16BIT: u8 = 1 << 2;

/// Header `sample_type` value for signed sample data.
const SAMPLES_SIGNED: u16 = 1;

const CELL_CHANNEL_MASK: u8 = 0x1F;
const CELL_HAS_NOTE: u8 = 0x20;
const CELL_HAS_VOLUME: u8 = 0x40;
const CELL_HAS_EFFECT: u8 = 0x80;
const NOTE_CUT: u8 = 0xFE;
const NOTE_NONE: u8 = 0xFF;

const DEFAULT_SAMPLE_RATE: u32 = 8363;

#[derive(BinRead, Debug)]
#[br(little)]
struct RawHeader {
    title: [u8; 28],
    eof_marker: u8,
    _file_type: u8,
    _reserved: u16,
    order_count: u16,
    instrument_count: u16,
    pattern_count: u16,
    _flags: u16,
    _tracker_version: u16,
    sample_type: u16,
    signature: [u8; 4],
    global_volume: u8,
    initial_speed: u8,
    initial_tempo: u8,
    master_volume: u8,
    _click_removal: u8,
    default_pan: u8,
    _reserved2: [u8; 8],
    _special: u16,
    channel_settings: [u8; 32],
}

#[derive(BinRead, Debug)]
#[br(little, import(orders: u16, instruments: u16, patterns: u16))]
struct RawTables {
    #[br(count = orders as usize)]
    orders: Vec<u8>,
    #[br(count = instruments as usize)]
    instrument_pointers: Vec<u16>,
    #[br(count = patterns as usize)]
    pattern_pointers: Vec<u16>,
}

#[derive(BinRead, Debug)]
#[br(little)]
struct RawInstrument {
    kind: u8,
    _filename: [u8; 12],
    data_pointer: [u8; 3],
    length: u32,
    loop_begin: u32,
    loop_end: u32,
    volume: u8,
    _reserved: u8,
    _pack: u8,
    flags: u8,
    sample_rate: u32,
    _internal: [u8; 12],
    name: [u8; 28],
    signature: [u8; 4],
}

impl RawInstrument {
    /// Byte offset of the sample payload.
    ///
    /// The 24-bit paragraph pointer is stored high byte first, then the low
    /// word little-endian.
    fn data_offset(&self) -> usize {
        let [b0, b1, b2] = self.data_pointer;
        ((b1 as usize) << 4) | ((b2 as usize) << 12) | ((b0 as usize) << 20)
    }
}

/// Load an S3M file from bytes.
pub fn load_s3m(data: &[u8]) -> Result<Song, FormatError> {
    if data.len() < HEADER_SIZE {
        return Err(FormatError::UnexpectedEof);
    }

    let mut cursor = Cursor::new(data);
    let header = RawHeader::read(&mut cursor)?;
    if header.eof_marker != EOF_MARKER || &header.signature != SONG_TAG {
        return Err(FormatError::InvalidSignature);
    }
    if header.initial_speed == 0 || header.initial_tempo == 0 {
        return Err(FormatError::InvalidTempo {
            speed: header.initial_speed,
            tempo: header.initial_tempo,
        });
    }

    let tables = RawTables::read_args(
        &mut cursor,
        (header.order_count, header.instrument_count, header.pattern_count),
    )?;

    let title = parse_string(&header.title);
    let mut song = Song::new(&title);
    song.initial_speed = header.initial_speed;
    song.initial_tempo = header.initial_tempo;
    song.global_volume = header.global_volume.min(64);
    song.master_volume = header.master_volume & 0x7F;
    song.stereo = header.master_volume & 0x80 != 0;

    let pan_table = if header.default_pan == PAN_TABLE_PRESENT {
        let mut table = [0u8; MAX_CHANNELS];
        let pos = cursor.position() as usize;
        match data.get(pos..pos + MAX_CHANNELS) {
            Some(bytes) => table.copy_from_slice(bytes),
            None => warn!("S3M pan table truncated, using channel defaults"),
        }
        Some(table)
    } else {
        None
    };
    song.channels = parse_channel_settings(&header.channel_settings, pan_table.as_ref());

    song.order = tables
        .orders
        .iter()
        .map(|&o| {
            if ORDER_MARKERS.contains(&o) {
                OrderEntry::Skip
            } else {
                OrderEntry::Pattern(o)
            }
        })
        .collect();

    let signed = header.sample_type == SAMPLES_SIGNED;
    for (index, &ptr) in tables.instrument_pointers.iter().enumerate() {
        let sample = parse_instrument(data, &mut cursor, index, ptr as usize * 16, signed)?;
        song.samples.push(sample);
    }

    let num_channels = song.num_channels();
    for &ptr in &tables.pattern_pointers {
        song.patterns.push(parse_pattern(data, ptr as usize * 16, num_channels)?);
    }

    debug!(
        "loaded S3M '{}': {} channels, {} orders, {} patterns, {} samples, speed {}, tempo {}",
        song.title,
        num_channels,
        song.order.len(),
        song.patterns.len(),
        song.samples.len(),
        song.initial_speed,
        song.initial_tempo
    );

    Ok(song)
}

/// Parse a NUL-padded string.
fn parse_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

/// Build channel settings. The song spans up to the last enabled channel.
///
/// Settings below 8 are left channels, 8..16 right channels, bit 7 marks a
/// disabled channel. A pan table entry with bit 5 set overrides the pan.
fn parse_channel_settings(raw: &[u8; 32], pan_table: Option<&[u8; 32]>) -> Vec<ChannelSettings> {
    let count = raw
        .iter()
        .rposition(|&s| s & 0x80 == 0)
        .map_or(0, |last| last + 1);

    (0..count)
        .map(|i| {
            let setting = raw[i];
            let mut pan = match setting {
                0..=7 => 0x3,
                8..=15 => 0xC,
                _ => ms_ir::PAN_CENTER,
            };
            if let Some(table) = pan_table {
                if table[i] & 0x20 != 0 {
                    pan = table[i] & 0x0F;
                }
            }
            ChannelSettings {
                enabled: setting & 0x80 == 0,
                pan,
            }
        })
        .collect()
}

/// Parse one instrument record into a sample.
fn parse_instrument(
    data: &[u8],
    cursor: &mut Cursor<&[u8]>,
    index: usize,
    offset: usize,
    signed: bool,
) -> Result<Sample, FormatError> {
    if offset + INSTRUMENT_SIZE > data.len() {
        return Err(FormatError::InvalidPointer(offset));
    }
    cursor.set_position(offset as u64);
    let raw = RawInstrument::read(cursor)?;

    match raw.kind {
        INSTRUMENT_EMPTY => return Ok(Sample::new(&parse_string(&raw.name))),
        INSTRUMENT_PCM => {}
        kind => return Err(FormatError::UnsupportedInstrument { index, kind }),
    }
    if &raw.signature != SAMPLE_TAG {
        return Err(FormatError::InvalidSampleSignature(index));
    }

    let mut sample = Sample::new(&parse_string(&raw.name));
    sample.default_volume = raw.volume.min(VOLUME_MAX);
    sample.sample_rate = if raw.sample_rate == 0 {
        DEFAULT_SAMPLE_RATE
    } else {
        raw.sample_rate
    };
    sample.data = read_sample_data(data, &raw, index, signed);

    let frames = sample.len() as u32;
    sample.looping = raw.flags & SAMPLE_FLAG_LOOP != 0;
    sample.loop_start = raw.loop_begin.min(frames);
    sample.loop_end = raw.loop_end.min(frames);

    Ok(sample)
}

/// Decode the sample payload. Stereo payloads store the whole left plane
/// followed by the whole right plane. A payload cut short by the end of the
/// file is clamped rather than rejected.
fn read_sample_data(data: &[u8], raw: &RawInstrument, index: usize, signed: bool) -> SampleData {
    let sixteen_bit = raw.flags & SAMPLE_FLAG_16BIT != 0;
    let stereo = raw.flags & SAMPLE_FLAG_STEREO != 0;
    let bytes_per_sample = if sixteen_bit { 2 } else { 1 };
    let frames = raw.length as usize;
    let plane_len = frames * bytes_per_sample;
    let start = raw.data_offset();

    let left = plane(data, start, plane_len, 0);
    let right = if stereo { plane(data, start, plane_len, 1) } else { &[] };
    let wanted = plane_len * if stereo { 2 } else { 1 };
    if left.len() + right.len() < wanted {
        warn!(
            "instrument {}: sample data truncated ({} of {} bytes)",
            index,
            left.len() + right.len(),
            wanted
        );
    }

    match (sixteen_bit, stereo) {
        (false, false) => SampleData::Mono8(decode_8bit(left, signed)),
        (true, false) => SampleData::Mono16(decode_16bit(left, signed)),
        (false, true) => {
            let n = left.len().min(right.len());
            SampleData::Stereo8(decode_8bit(&left[..n], signed), decode_8bit(&right[..n], signed))
        }
        (true, true) => {
            let n = left.len().min(right.len()) & !1;
            SampleData::Stereo16(
                decode_16bit(&left[..n], signed),
                decode_16bit(&right[..n], signed),
            )
        }
    }
}

/// The `n`th plane of a planar payload, clamped to the file.
fn plane(data: &[u8], start: usize, plane_len: usize, n: usize) -> &[u8] {
    let begin = start.saturating_add(n * plane_len).min(data.len());
    let end = start.saturating_add((n + 1) * plane_len).min(data.len());
    &data[begin..end]
}

fn decode_8bit(bytes: &[u8], signed: bool) -> Vec<i8> {
    let flip = if signed { 0 } else { 0x80 };
    bytes.iter().map(|&b| (b ^ flip) as i8).collect()
}

fn decode_16bit(bytes: &[u8], signed: bool) -> Vec<i16> {
    let flip = if signed { 0 } else { 0x8000 };
    bytes
        .chunks_exact(2)
        .map(|c| (u16::from_le_bytes([c[0], c[1]]) ^ flip) as i16)
        .collect()
}

/// Parse a packed pattern. A zero pointer is an empty pattern.
fn parse_pattern(data: &[u8], offset: usize, num_channels: u8) -> Result<Pattern, FormatError> {
    let mut pattern = Pattern::new(ROWS_PER_PATTERN, num_channels);
    if offset == 0 {
        return Ok(pattern);
    }

    let mut reader = ByteReader::new(data);
    reader.seek(offset)?;
    let _packed_len = reader.read_u16_le()?;

    let mut dropped = 0usize;
    for row in 0..ROWS_PER_PATTERN {
        loop {
            let what = reader.read_u8()?;
            if what == 0 {
                break;
            }
            let note = parse_cell(&mut reader, what)?;
            let channel = what & CELL_CHANNEL_MASK;
            if channel < num_channels {
                *pattern.note_mut(channel, row) = note;
            } else {
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(
            "pattern at 0x{:X}: dropped {} cells on channels beyond {}",
            offset, dropped, num_channels
        );
    }
    Ok(pattern)
}

/// Decode one packed cell following its leading flag byte.
fn parse_cell(reader: &mut ByteReader<'_>, what: u8) -> Result<Note, FormatError> {
    let mut note = Note {
        initialized: true,
        ..Note::empty()
    };

    if what & CELL_HAS_NOTE != 0 {
        let raw_note = reader.read_u8()?;
        let instrument = reader.read_u8()?;
        match raw_note {
            NOTE_CUT => note.key = Key::Cut,
            NOTE_NONE => {}
            n => {
                note.octave = n >> 4;
                note.key = Key::from_semitone(n & 0x0F);
            }
        }
        note.sample = instrument.checked_sub(1);
    }

    if what & CELL_HAS_VOLUME != 0 {
        note.volume = reader.read_u8()?.min(VOLUME_MAX);
    } else if note.key.is_pitched() {
        note.volume = VOLUME_MAX;
    } else {
        note.volume = VOLUME_KEEP;
    }

    if what & CELL_HAS_EFFECT != 0 {
        note.effect = Effect::from_command(reader.read_u8()?);
        note.param = reader.read_u8()?;
    }

    Ok(note)
}
