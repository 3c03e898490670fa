//! In-memory S3M writer for integration tests.
#![allow(dead_code)]

use ms_ir::Effect;

pub const HEADER_SIZE: usize = 96;

/// Sample payload of a test instrument.
pub enum Pcm {
    Mono8(Vec<i8>),
    Mono16(Vec<i16>),
}

pub struct Instrument {
    pub pcm: Pcm,
    pub sample_rate: u32,
    pub looped: Option<(u32, u32)>,
}

impl Instrument {
    pub fn mono16(data: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            pcm: Pcm::Mono16(data),
            sample_rate,
            looped: None,
        }
    }

    pub fn mono8(data: Vec<i8>, sample_rate: u32) -> Self {
        Self {
            pcm: Pcm::Mono8(data),
            sample_rate,
            looped: None,
        }
    }

    pub fn looping(mut self, start: u32, end: u32) -> Self {
        self.looped = Some((start, end));
        self
    }

    fn frames(&self) -> usize {
        match &self.pcm {
            Pcm::Mono8(v) => v.len(),
            Pcm::Mono16(v) => v.len(),
        }
    }

    fn payload(&self) -> Vec<u8> {
        match &self.pcm {
            Pcm::Mono8(v) => v.iter().map(|&s| s as u8).collect(),
            Pcm::Mono16(v) => v.iter().flat_map(|s| s.to_le_bytes()).collect(),
        }
    }
}

/// One packed pattern cell.
#[derive(Clone, Copy, Default)]
pub struct Cell {
    pub row: u8,
    pub channel: u8,
    /// Raw note byte (octave << 4 | semitone, 0xFE cut) and 1-based instrument
    pub note: Option<(u8, u8)>,
    pub volume: Option<u8>,
    pub effect: Option<(Effect, u8)>,
}

impl Cell {
    pub fn note(row: u8, channel: u8, octave: u8, semitone: u8, instrument: u8) -> Self {
        Self {
            row,
            channel,
            note: Some((octave << 4 | semitone, instrument)),
            ..Self::default()
        }
    }

    pub fn effect(row: u8, channel: u8, effect: Effect, param: u8) -> Self {
        Self {
            row,
            channel,
            effect: Some((effect, param)),
            ..Self::default()
        }
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_effect(mut self, effect: Effect, param: u8) -> Self {
        self.effect = Some((effect, param));
        self
    }
}

pub struct S3mWriter {
    pub title: String,
    pub speed: u8,
    pub tempo: u8,
    pub stereo: bool,
    /// Raw channel settings; 0..8 left, 8..16 right
    pub channels: Vec<u8>,
    pub orders: Vec<u8>,
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Vec<Cell>>,
}

impl S3mWriter {
    pub fn new(channels: usize) -> Self {
        Self {
            title: "test song".to_string(),
            speed: 6,
            tempo: 125,
            stereo: false,
            channels: (0..channels).map(|i| if i % 2 == 0 { i as u8 / 2 } else { 8 + i as u8 / 2 }).collect(),
            orders: Vec::new(),
            instruments: Vec::new(),
            patterns: Vec::new(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let tables = self.orders.len() + 2 * self.instruments.len() + 2 * self.patterns.len();
        let mut out = vec![0u8; HEADER_SIZE + tables];
        pad16(&mut out);

        // instrument records
        let mut instrument_ptrs = Vec::new();
        for _ in &self.instruments {
            instrument_ptrs.push(out.len() / 16);
            out.extend_from_slice(&[0u8; 80]);
        }

        // sample payloads, patched into the records afterwards
        for (i, instrument) in self.instruments.iter().enumerate() {
            let data_ptr = out.len() / 16;
            out.extend_from_slice(&instrument.payload());
            pad16(&mut out);

            let at = instrument_ptrs[i] * 16;
            let rec = &mut out[at..at + 80];
            rec[0] = 1;
            rec[13] = (data_ptr >> 16) as u8;
            rec[14] = data_ptr as u8;
            rec[15] = (data_ptr >> 8) as u8;
            rec[16..20].copy_from_slice(&(instrument.frames() as u32).to_le_bytes());
            let mut flags = 0u8;
            if let Some((start, end)) = instrument.looped {
                rec[20..24].copy_from_slice(&start.to_le_bytes());
                rec[24..28].copy_from_slice(&end.to_le_bytes());
                flags |= 1;
            }
            if matches!(instrument.pcm, Pcm::Mono16(_)) {
                flags |= 4;
            }
            rec[28] = 64;
            rec[31] = flags;
            rec[32..36].copy_from_slice(&instrument.sample_rate.to_le_bytes());
            rec[76..80].copy_from_slice(b"SCRS");
        }

        let mut pattern_ptrs = Vec::new();
        for cells in &self.patterns {
            pattern_ptrs.push(out.len() / 16);
            let packed = pack_pattern(cells);
            out.extend_from_slice(&(packed.len() as u16 + 2).to_le_bytes());
            out.extend_from_slice(&packed);
            pad16(&mut out);
        }

        let title = self.title.as_bytes();
        out[..title.len().min(28)].copy_from_slice(&title[..title.len().min(28)]);
        out[28] = 0x1A;
        out[29] = 16;
        out[32..34].copy_from_slice(&(self.orders.len() as u16).to_le_bytes());
        out[34..36].copy_from_slice(&(self.instruments.len() as u16).to_le_bytes());
        out[36..38].copy_from_slice(&(self.patterns.len() as u16).to_le_bytes());
        out[40..42].copy_from_slice(&0x1320u16.to_le_bytes());
        out[42..44].copy_from_slice(&1u16.to_le_bytes());
        out[44..48].copy_from_slice(b"SCRM");
        out[48] = 64;
        out[49] = self.speed;
        out[50] = self.tempo;
        out[51] = 48 | if self.stereo { 0x80 } else { 0 };
        for (i, slot) in out[64..96].iter_mut().enumerate() {
            *slot = self.channels.get(i).copied().unwrap_or(0xFF);
        }

        let mut at = HEADER_SIZE;
        out[at..at + self.orders.len()].copy_from_slice(&self.orders);
        at += self.orders.len();
        for ptr in instrument_ptrs.iter().chain(pattern_ptrs.iter()) {
            out[at..at + 2].copy_from_slice(&(*ptr as u16).to_le_bytes());
            at += 2;
        }
        out
    }
}

fn pad16(out: &mut Vec<u8>) {
    while out.len() % 16 != 0 {
        out.push(0);
    }
}

fn pack_pattern(cells: &[Cell]) -> Vec<u8> {
    let mut packed = Vec::new();
    for row in 0..64u8 {
        for cell in cells.iter().filter(|c| c.row == row) {
            let mut what = cell.channel & 0x1F;
            if cell.note.is_some() {
                what |= 0x20;
            }
            if cell.volume.is_some() {
                what |= 0x40;
            }
            if cell.effect.is_some() {
                what |= 0x80;
            }
            packed.push(what);
            if let Some((note, instrument)) = cell.note {
                packed.extend_from_slice(&[note, instrument]);
            }
            if let Some(volume) = cell.volume {
                packed.push(volume);
            }
            if let Some((effect, param)) = cell.effect {
                packed.extend_from_slice(&[effect.command(), param]);
            }
        }
        packed.push(0);
    }
    packed
}
