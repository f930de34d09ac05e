use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialframe_frame::{DelimiterPolicy, EngineConfig};
use serialframe_transport::LineSettings;

/// How long `send_command` keeps retrying a port that is not ready to accept
/// bytes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything a session needs to open a port.
///
/// Values set here while the session is closed become the defaults for the
/// next `open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Port identifier, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: Option<String>,
    /// Electrical parameters. Default: 9600 8-N-1.
    #[serde(default)]
    pub line: LineSettings,
    /// Initial delimiter policy. Default: timed, 150 ms.
    #[serde(default)]
    pub policy: DelimiterPolicy,
    /// Engine tuning; not part of the serialized form.
    #[serde(skip)]
    pub engine: EngineConfig,
    /// Deadline for one command write. Default: 1 s.
    #[serde(skip, default = "default_write_timeout")]
    pub write_timeout: Duration,
}

fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            line: LineSettings::default(),
            policy: DelimiterPolicy::default(),
            engine: EngineConfig::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    pub fn with_line(mut self, line: LineSettings) -> Self {
        self.line = line;
        self
    }

    pub fn with_policy(mut self, policy: DelimiterPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}
