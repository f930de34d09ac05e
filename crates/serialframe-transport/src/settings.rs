use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Baud rate used when none (or zero) is supplied.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// Map a word length in bits, `None` outside 5..=8.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(DataBits::Five),
            6 => Some(DataBits::Six),
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    /// Map the single-letter code `N`, `O` or `E` (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "N" | "n" => Some(Parity::None),
            "O" | "o" => Some(Parity::Odd),
            "E" | "e" => Some(Parity::Even),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    One,
    Two,
}

/// Electrical parameters of a serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl LineSettings {
    /// Build settings from loosely typed caller input.
    ///
    /// Invalid values never fail the call. Each one is replaced by a safe
    /// default and logged: baud `0` becomes 9600, an unknown parity code
    /// becomes none, any stop-bit count other than 1 becomes two, a word
    /// length outside 5..=8 becomes 8.
    pub fn from_raw(baud_rate: u32, parity: &str, stop_bits: u8, word_length: u8) -> Self {
        let baud_rate = if baud_rate == 0 {
            warn!(baud_rate, substitute = DEFAULT_BAUD_RATE, "invalid baud rate");
            DEFAULT_BAUD_RATE
        } else {
            baud_rate
        };

        let parity = Parity::from_code(parity).unwrap_or_else(|| {
            warn!(parity, substitute = "N", "invalid parity");
            Parity::None
        });

        let stop_bits = match stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                warn!(stop_bits = other, substitute = 2, "invalid stop bits");
                StopBits::Two
            }
        };

        let data_bits = DataBits::from_bits(word_length).unwrap_or_else(|| {
            warn!(word_length, substitute = 8, "invalid word length");
            DataBits::Eight
        });

        Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        }
    }
}

impl fmt::Display for LineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(
            f,
            "{} {}-{}-{}",
            self.baud_rate,
            self.data_bits.bits(),
            self.parity.code(),
            stop
        )
    }
}
