use bytes::BytesMut;

use crate::error::Result;
use crate::settings::LineSettings;

/// An open, character-oriented byte transport.
///
/// Every method must return promptly: implementations never wait for bytes
/// that have not arrived yet. The framing engine polls `read_available` from
/// inside an async task, so a blocking implementation would stall it.
pub trait SerialTransport: Send + 'static {
    /// Append every byte currently buffered by the driver to `dst`.
    ///
    /// Returns the number of bytes appended, `0` when nothing is pending.
    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize>;

    /// Write as much of `data` as the driver accepts right now.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Apply electrical line settings to the open port.
    fn configure(&mut self, settings: &LineSettings) -> Result<()>;

    /// Port identifier for diagnostics.
    fn port_name(&self) -> &str;
}

/// Opens transports and enumerates the ports a machine exposes.
///
/// Closing a transport is dropping it.
pub trait PortConnector: Send + Sync + 'static {
    type Transport: SerialTransport;

    /// Open `port` and apply `settings`.
    fn open(&self, port: &str, settings: &LineSettings) -> Result<Self::Transport>;

    /// Identifiers of the ports currently available.
    fn list_ports(&self) -> Result<Vec<String>>;
}
