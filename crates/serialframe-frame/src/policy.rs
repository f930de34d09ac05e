use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Flush interval of the default timed policy, in milliseconds.
pub const DEFAULT_INTERVAL_MS: u32 = 150;

/// Flush cadence used while splitting on a delimiter code.
pub const CODE_DELIMITED_CADENCE: Duration = Duration::from_millis(150);

/// How the engine cuts the byte stream into messages.
///
/// Exactly one policy is active per session at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DelimiterPolicy {
    /// Emit whatever arrived during each `interval_ms` window.
    Timed { interval_ms: u32 },
    /// Cut after every occurrence of `code`.
    #[serde(rename = "code")]
    CodeDelimited { code: u16 },
}

impl Default for DelimiterPolicy {
    fn default() -> Self {
        DelimiterPolicy::Timed {
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl DelimiterPolicy {
    pub fn timed(interval: Duration) -> Self {
        let interval_ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        DelimiterPolicy::Timed { interval_ms }
    }

    pub fn code(code: u16) -> Self {
        DelimiterPolicy::CodeDelimited { code }
    }

    /// Replace a zero timed interval (which could never tick) with the default.
    pub fn normalized(self) -> Self {
        match self {
            DelimiterPolicy::Timed { interval_ms: 0 } => {
                warn!(
                    substitute = DEFAULT_INTERVAL_MS,
                    "timed interval of 0 ms is invalid"
                );
                DelimiterPolicy::default()
            }
            DelimiterPolicy::CodeDelimited { code } if code > 0xFF => {
                warn!(code, "delimiter code is above 0xFF and will never match a byte");
                self
            }
            other => other,
        }
    }

    /// Tick period required by this policy.
    pub fn cadence(&self) -> Duration {
        match self {
            DelimiterPolicy::Timed { interval_ms } => {
                Duration::from_millis(u64::from((*interval_ms).max(1)))
            }
            DelimiterPolicy::CodeDelimited { .. } => CODE_DELIMITED_CADENCE,
        }
    }
}

impl fmt::Display for DelimiterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterPolicy::Timed { interval_ms } => write!(f, "timed({interval_ms}ms)"),
            DelimiterPolicy::CodeDelimited { code } => write!(f, "code(0x{code:02X})"),
        }
    }
}
