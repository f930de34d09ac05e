//! Serial port transport abstraction.
//!
//! Provides a unified, non-blocking interface over character-oriented
//! transports:
//! - Physical serial ports via `tokio-serial` ([`SystemPorts`])
//! - In-memory simulated ports ([`sim::SimConnector`])
//!
//! This is the lowest layer of serialframe. The framing engine and the
//! session controller only ever see the [`SerialTransport`] and
//! [`PortConnector`] traits defined here.

pub mod error;
pub mod serial;
pub mod settings;
pub mod sim;
pub mod traits;

pub use error::{Result, TransportError};
pub use serial::{SerialPortTransport, SystemPorts};
pub use settings::{DataBits, LineSettings, Parity, StopBits, DEFAULT_BAUD_RATE};
pub use traits::{PortConnector, SerialTransport};
