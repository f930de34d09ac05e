//! Framed serial port communication.
//!
//! serialframe reads a serial port in the background and cuts the byte
//! stream into messages, either per time window or after a delimiter byte,
//! and encodes human-written commands into the bytes to send back.
//!
//! # Crate Structure
//!
//! - [`transport`]: port traits, line settings, tokio-serial backend, simulator
//! - [`frame`]: delimiter policies, the framing engine, the command encoder
//! - [`session`]: the session controller tying one port to one engine

/// Re-export transport types.
pub mod transport {
    pub use serialframe_transport::*;
}

/// Re-export framing types.
pub mod frame {
    pub use serialframe_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use serialframe_session::*;
}

pub use serialframe_frame::{encode_command, DelimiterPolicy, Message};
pub use serialframe_session::{Session, SessionConfig, SessionState};
pub use serialframe_transport::{LineSettings, SystemPorts};
