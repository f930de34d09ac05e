use serialframe_transport::{PortConnector, SystemPorts};

use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    let ports = SystemPorts
        .list_ports()
        .map_err(|err| transport_error("port enumeration failed", &err))?;
    tracing::debug!(count = ports.len(), "enumerated serial ports");
    print_ports(&ports, format);
    Ok(SUCCESS)
}
