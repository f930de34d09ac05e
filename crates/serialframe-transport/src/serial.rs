use std::fmt;
use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::settings::{DataBits, LineSettings, Parity, StopBits};
use crate::traits::{PortConnector, SerialTransport};

/// Connector for the machine's physical serial ports.
///
/// Opening registers the port with the current tokio reactor, so `open` must
/// run inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortConnector for SystemPorts {
    type Transport = SerialPortTransport;

    fn open(&self, port: &str, settings: &LineSettings) -> Result<SerialPortTransport> {
        let stream = tokio_serial::new(port, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits))
            .parity(parity(settings.parity))
            .stop_bits(stop_bits(settings.stop_bits))
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|err| TransportError::Open {
                port: port.to_string(),
                source: std::io::Error::other(err),
            })?;

        info!(port, %settings, "opened serial port");
        Ok(SerialPortTransport {
            stream,
            name: port.to_string(),
        })
    }

    fn list_ports(&self) -> Result<Vec<String>> {
        let ports = tokio_serial::available_ports()
            .map_err(|err| TransportError::Enumerate(std::io::Error::other(err)))?;
        Ok(ports.into_iter().map(|info| info.port_name).collect())
    }
}

/// An open physical serial port.
pub struct SerialPortTransport {
    stream: SerialStream,
    name: String,
}

impl SerialTransport for SerialPortTransport {
    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let pending = self
            .stream
            .bytes_to_read()
            .map_err(|err| TransportError::Io(std::io::Error::other(err)))?
            as usize;
        if pending == 0 {
            return Ok(0);
        }

        let start = dst.len();
        dst.resize(start + pending, 0);
        match self.stream.try_read(&mut dst[start..]) {
            Ok(n) => {
                dst.truncate(start + n);
                Ok(n)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                dst.truncate(start);
                Ok(0)
            }
            Err(err) => {
                dst.truncate(start);
                Err(TransportError::Io(err))
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.stream.try_write(data).map_err(TransportError::Io)
    }

    fn configure(&mut self, settings: &LineSettings) -> Result<()> {
        let name = self.name.clone();
        let to_err = |err: tokio_serial::Error| TransportError::Configure {
            port: name.clone(),
            source: std::io::Error::other(err),
        };

        self.stream
            .set_baud_rate(settings.baud_rate)
            .map_err(to_err)?;
        self.stream
            .set_data_bits(data_bits(settings.data_bits))
            .map_err(to_err)?;
        self.stream
            .set_parity(parity(settings.parity))
            .map_err(to_err)?;
        self.stream
            .set_stop_bits(stop_bits(settings.stop_bits))
            .map_err(to_err)?;

        debug!(port = %self.name, %settings, "applied line settings");
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("port", &self.name)
            .finish()
    }
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Five => tokio_serial::DataBits::Five,
        DataBits::Six => tokio_serial::DataBits::Six,
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn stop_bits(stop: StopBits) -> tokio_serial::StopBits {
    match stop {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}
