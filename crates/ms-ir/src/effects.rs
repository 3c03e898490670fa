//! Effect command tags for pattern notes.

/// Effect column command.
///
/// Only the tag is stored here; the parameter byte travels alongside it on
/// the [`Note`](crate::Note). Commands outside the supported subset are kept
/// as [`Effect::Unsupported`] so a loaded song still round-trips its data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    #[default]
    None,
    /// Set ticks per row (Axx)
    SetSpeed,
    /// Jump to order position (Bxx)
    PositionJump,
    /// Break to the first row of the next order (Cxx)
    PatternBreak,
    /// Volume slide up/down per tick (Dxy)
    VolumeSlide,
    /// Slide pitch down per tick (Exx)
    PortamentoDown,
    /// Slide pitch up per tick (Fxx)
    PortamentoUp,
    /// Set tempo in BPM (Txx)
    SetTempo,
    /// Any other command, by its raw S3M number
    Unsupported(u8),
}

impl Effect {
    /// Map a raw S3M command number (1 = 'A') to an effect tag.
    pub const fn from_command(cmd: u8) -> Self {
        match cmd {
            0 => Effect::None,
            1 => Effect::SetSpeed,
            2 => Effect::PositionJump,
            3 => Effect::PatternBreak,
            4 => Effect::VolumeSlide,
            5 => Effect::PortamentoDown,
            6 => Effect::PortamentoUp,
            20 => Effect::SetTempo,
            other => Effect::Unsupported(other),
        }
    }

    /// Raw S3M command number for this tag.
    pub const fn command(self) -> u8 {
        match self {
            Effect::None => 0,
            Effect::SetSpeed => 1,
            Effect::PositionJump => 2,
            Effect::PatternBreak => 3,
            Effect::VolumeSlide => 4,
            Effect::PortamentoDown => 5,
            Effect::PortamentoUp => 6,
            Effect::SetTempo => 20,
            Effect::Unsupported(cmd) => cmd,
        }
    }

    /// Returns the variant name as a static string.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::None => "None",
            Effect::SetSpeed => "SetSpeed",
            Effect::PositionJump => "PositionJump",
            Effect::PatternBreak => "PatternBreak",
            Effect::VolumeSlide => "VolumeSlide",
            Effect::PortamentoDown => "PortamentoDown",
            Effect::PortamentoUp => "PortamentoUp",
            Effect::SetTempo => "SetTempo",
            Effect::Unsupported(_) => "Unsupported",
        }
    }

    /// Returns true if this effect is processed only on the row's first tick.
    pub fn is_row_effect(&self) -> bool {
        matches!(
            self,
            Effect::SetSpeed | Effect::PositionJump | Effect::PatternBreak | Effect::SetTempo
        )
    }

    /// Returns true if this effect is applied on every tick.
    pub fn is_tick_effect(&self) -> bool {
        matches!(
            self,
            Effect::VolumeSlide | Effect::PortamentoDown | Effect::PortamentoUp
        )
    }
}
