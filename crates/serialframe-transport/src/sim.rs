//! In-memory serial ports for tests and hardware-free embedding.
//!
//! A [`SimConnector`] owns a set of named [`SimPort`]s. Opening a port hands
//! out a [`SimTransport`] that shares state with the `SimPort`, so the test
//! side can inject inbound bytes, inspect what was written, and script read
//! failures while the framing engine runs.

use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::BytesMut;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::settings::LineSettings;
use crate::traits::{PortConnector, SerialTransport};

#[derive(Debug, Default)]
struct SimState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    applied: Vec<LineSettings>,
    read_faults: VecDeque<ErrorKind>,
    persistent_read_fault: Option<ErrorKind>,
    write_faults: VecDeque<ErrorKind>,
    persistent_write_fault: Option<ErrorKind>,
    write_limit: Option<usize>,
    write_budget: Option<usize>,
    writes: usize,
    open_count: usize,
    is_open: bool,
    reads: usize,
}

/// Test-side handle to one simulated port.
#[derive(Debug, Clone)]
pub struct SimPort {
    name: String,
    state: Arc<Mutex<SimState>>,
}

impl SimPort {
    /// Create a detached port.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make `bytes` available to the next `read_available` call.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    /// Bytes received by the driver but not yet read.
    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Take everything written so far.
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().outbound)
    }

    /// Every set of line settings applied, in order.
    pub fn applied_settings(&self) -> Vec<LineSettings> {
        self.lock().applied.clone()
    }

    /// Fail the next read with `kind` (queued, one per call).
    pub fn fail_next_read(&self, kind: ErrorKind) {
        self.lock().read_faults.push_back(kind);
    }

    /// Fail every read with `kind` until cleared with `None`.
    pub fn set_persistent_read_fault(&self, kind: Option<ErrorKind>) {
        self.lock().persistent_read_fault = kind;
    }

    /// Fail the next write with `kind` (queued, one per call).
    pub fn fail_next_write(&self, kind: ErrorKind) {
        self.lock().write_faults.push_back(kind);
    }

    /// Fail every write with `kind` until cleared with `None`.
    pub fn set_persistent_write_fault(&self, kind: Option<ErrorKind>) {
        self.lock().persistent_write_fault = kind;
    }

    /// Accept at most `limit` bytes per write call. `Some(0)` makes every
    /// write report zero bytes.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.lock().write_limit = limit;
    }

    /// Accept `budget` more bytes in total, then fail writes with
    /// `BrokenPipe`.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.lock().write_budget = budget;
    }

    /// How many write attempts the transport has seen.
    pub fn write_calls(&self) -> usize {
        self.lock().writes
    }

    /// Whether a transport for this port is currently open.
    pub fn is_open(&self) -> bool {
        self.lock().is_open
    }

    /// How many times the port has been opened.
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    /// How many read attempts the transport has seen.
    pub fn read_calls(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding the lock only happens in a failing test;
        // the state itself stays consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Simulated open transport; closing is dropping.
#[derive(Debug)]
pub struct SimTransport {
    port: SimPort,
}

impl SerialTransport for SimTransport {
    fn read_available(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let mut state = self.port.lock();
        state.reads += 1;
        if let Some(kind) = state.read_faults.pop_front() {
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }
        if let Some(kind) = state.persistent_read_fault {
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }

        let n = state.inbound.len();
        dst.extend(state.inbound.drain(..));
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.port.lock();
        state.writes += 1;
        if let Some(kind) = state.write_faults.pop_front() {
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }
        if let Some(kind) = state.persistent_write_fault {
            return Err(TransportError::Io(std::io::Error::from(kind)));
        }

        let mut n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if let Some(budget) = state.write_budget {
            if budget == 0 && !data.is_empty() {
                return Err(TransportError::Io(std::io::Error::from(
                    ErrorKind::BrokenPipe,
                )));
            }
            n = n.min(budget);
            state.write_budget = Some(budget - n);
        }
        state.outbound.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn configure(&mut self, settings: &LineSettings) -> Result<()> {
        self.port.lock().applied.push(*settings);
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.port.name
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        debug!(port = %self.port.name, "simulated port released");
        self.port.lock().is_open = false;
    }
}

/// Connector over a fixed set of simulated ports.
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    ports: Arc<Mutex<HashMap<String, SimPort>>>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port and return its test-side handle.
    pub fn add_port(&self, name: impl Into<String>) -> SimPort {
        let port = SimPort::new(name);
        self.ports_lock()
            .insert(port.name.clone(), port.clone());
        port
    }

    /// Remove a port, so later opens fail with `NotFound`.
    pub fn unplug(&self, name: &str) {
        self.ports_lock().remove(name);
    }

    fn ports_lock(&self) -> MutexGuard<'_, HashMap<String, SimPort>> {
        self.ports.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PortConnector for SimConnector {
    type Transport = SimTransport;

    fn open(&self, port: &str, settings: &LineSettings) -> Result<SimTransport> {
        let sim = self
            .ports_lock()
            .get(port)
            .cloned()
            .ok_or_else(|| TransportError::Open {
                port: port.to_string(),
                source: std::io::Error::new(ErrorKind::NotFound, "no such simulated port"),
            })?;

        {
            let mut state = sim.lock();
            if state.is_open {
                return Err(TransportError::Open {
                    port: port.to_string(),
                    source: std::io::Error::new(ErrorKind::ResourceBusy, "port already in use"),
                });
            }
            state.is_open = true;
            state.open_count += 1;
            state.applied.push(*settings);
        }

        debug!(port, %settings, "opened simulated port");
        Ok(SimTransport { port: sim })
    }

    fn list_ports(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.ports_lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
