/// Performance mode values shared by the arbiter, the IPC protocol and the actuator.
///
/// The numeric ordinals are fixed by the downstream actuator and must not be
/// reordered: 0 = Balanced, 1 = Turbo, 2 = Silent.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// One of the three performance profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Also called "performance" on the wire.
    #[serde(rename = "performance")]
    Balanced,
    #[serde(rename = "turbo")]
    Turbo,
    #[serde(rename = "silent")]
    Silent,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Balanced, Mode::Turbo, Mode::Silent];

    /// Ordinal passed across the actuator boundary.
    pub fn index(self) -> u8 {
        match self {
            Mode::Balanced => 0,
            Mode::Turbo => 1,
            Mode::Silent => 2,
        }
    }

    pub fn from_index(index: u8) -> Option<Mode> {
        match index {
            0 => Some(Mode::Balanced),
            1 => Some(Mode::Turbo),
            2 => Some(Mode::Silent),
            _ => None,
        }
    }

    /// Lowercase literal used on the wire and on the command line.
    pub fn token(self) -> &'static str {
        match self {
            Mode::Balanced => "performance",
            Mode::Turbo => "turbo",
            Mode::Silent => "silent",
        }
    }

    /// Human-readable name for display layers.
    pub fn display_name(self) -> &'static str {
        match self {
            Mode::Balanced => "Balanced",
            Mode::Turbo => "Turbo",
            Mode::Silent => "Silent",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    /// Case-insensitive; surrounding whitespace is not stripped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.token().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownMode(s.to_string()))
    }
}

/// Whether a mode change came from explicit intent (CLI / IPC) or from the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOrigin {
    Manual,
    Auto,
}

impl ModeOrigin {
    pub fn is_automatic(self) -> bool {
        self == ModeOrigin::Auto
    }

    pub fn indicator(self) -> &'static str {
        match self {
            ModeOrigin::Manual => "[M]",
            ModeOrigin::Auto => "[A]",
        }
    }
}

/// Renders e.g. `"[A] Turbo"`.
pub fn display_label(mode: Mode, origin: ModeOrigin) -> String {
    format!("{} {}", origin.indicator(), mode.display_name())
}
