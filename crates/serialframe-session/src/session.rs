use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serialframe_frame::{
    encode_command, DelimiterPolicy, EngineHandle, EngineState, FrameError, Message,
    SharedTransport,
};
use serialframe_transport::{LineSettings, PortConnector, SerialTransport, TransportError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Open,
    /// The engine stopped on its own; `close` must still be called to
    /// release the port.
    Failed(String),
}

/// Result of [`Session::send_command`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    /// Bytes handed to the transport.
    pub bytes_sent: Vec<u8>,
    pub error: Option<String>,
}

impl SendOutcome {
    fn failed(bytes_sent: Vec<u8>, error: impl ToString) -> Self {
        Self {
            bytes_sent,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

struct Active<T> {
    port: String,
    transport: SharedTransport<T>,
    engine: EngineHandle,
}

/// One serial port session: the open transport and the framing engine that
/// reads it.
///
/// The transport is never released while the engine may still use it.
pub struct Session<C: PortConnector> {
    connector: C,
    config: SessionConfig,
    active: Option<Active<C::Transport>>,
}

impl<C: PortConnector> Session<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            active: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Port of the running session, or the one the next `open` will use.
    pub fn port(&self) -> Option<&str> {
        match &self.active {
            Some(active) => Some(&active.port),
            None => self.config.port.as_deref(),
        }
    }

    /// Select the port used by the next `open`.
    pub fn set_port(&mut self, port: impl Into<String>) {
        self.config.port = Some(port.into());
    }

    /// Store line settings and apply them to the live port, if any.
    pub fn configure(&mut self, settings: LineSettings) -> Result<()> {
        self.config.line = settings;
        let Some(active) = &self.active else {
            return Ok(());
        };

        let mut transport = active
            .transport
            .lock()
            .map_err(|_| FrameError::TransportPoisoned)?;
        transport.configure(&settings)?;
        info!(port = %active.port, %settings, "line settings applied");
        Ok(())
    }

    /// Store the delimiter policy and hand it to the running engine, if any.
    /// Never blocks.
    pub fn set_delimiter(&mut self, policy: DelimiterPolicy) {
        let policy = policy.normalized();
        self.config.policy = policy;
        if let Some(active) = &self.active {
            active.engine.set_policy(policy);
            debug!(port = %active.port, %policy, "delimiter policy sent to engine");
        }
    }

    /// Open the configured port and start framing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(&mut self) -> Result<()> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyOpen(active.port.clone()));
        }
        let port = self.config.port.clone().ok_or(SessionError::NoPort)?;
        tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let transport = self
            .connector
            .open(&port, &self.config.line)
            .map_err(SessionError::Open)?;
        let transport = Arc::new(Mutex::new(transport));
        let engine = serialframe_frame::spawn(
            Arc::clone(&transport),
            self.config.policy,
            self.config.engine.clone(),
        );

        info!(
            port = %port,
            settings = %self.config.line,
            policy = %self.config.policy,
            "session opened"
        );
        self.active = Some(Active {
            port,
            transport,
            engine,
        });
        Ok(())
    }

    /// Stop the engine, wait for it, then release the port.
    ///
    /// A no-op when not open. If the engine had failed, the port is still
    /// released and the failure is returned.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };

        let outcome = active.engine.shutdown().await;
        let Active {
            port,
            transport,
            engine,
        } = active;
        drop(engine);
        drop(transport);

        match &outcome {
            Ok(()) => info!(port = %port, "session closed"),
            Err(err) => warn!(port = %port, error = %err, "session closed after engine failure"),
        }
        outcome.map_err(SessionError::from)
    }

    /// Everything received so far, oldest first. Never blocks.
    pub fn drain_received(&mut self) -> Vec<Message> {
        match &mut self.active {
            Some(active) => active.engine.drain(),
            None => Vec::new(),
        }
    }

    /// Wait for the next message. `None` when closed or once the engine has
    /// stopped and everything was drained.
    pub async fn recv(&mut self) -> Option<Message> {
        match &mut self.active {
            Some(active) => active.engine.recv().await,
            None => None,
        }
    }

    /// Encode `text` and transmit it.
    ///
    /// Nothing is transmitted when encoding fails. A port that keeps
    /// refusing bytes is retried at the engine's read cadence until
    /// `SessionConfig::write_timeout`; the outcome then carries the prefix
    /// that was written.
    pub async fn send_command(&mut self, text: &str) -> SendOutcome {
        let encoded = encode_command(text);
        if let Some(err) = encoded.error() {
            return SendOutcome::failed(Vec::new(), err);
        }
        let Some(active) = &self.active else {
            return SendOutcome::failed(Vec::new(), SessionError::NotOpen);
        };

        let data = encoded.bytes();
        let mut written = 0;
        let pacing = WritePacing {
            retry: self.config.engine.read_interval,
            timeout: self.config.write_timeout,
        };
        match write_all(&active.transport, data, &mut written, pacing).await {
            Ok(()) => {
                debug!(port = %active.port, bytes = written, "command sent");
                SendOutcome {
                    bytes_sent: data.to_vec(),
                    error: None,
                }
            }
            Err(err) => {
                warn!(port = %active.port, error = %err, written, "command write failed");
                SendOutcome::failed(data[..written].to_vec(), err)
            }
        }
    }

    /// Ports the connector can see.
    pub fn list_ports(&self) -> Result<Vec<String>> {
        Ok(self.connector.list_ports()?)
    }

    pub fn state(&self) -> SessionState {
        match &self.active {
            None => SessionState::Closed,
            Some(active) => match active.engine.state() {
                EngineState::Failed(reason) => SessionState::Failed(reason),
                _ => SessionState::Open,
            },
        }
    }

    /// Whether a port is held, including after an engine failure.
    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
struct WritePacing {
    retry: Duration,
    timeout: Duration,
}

async fn write_all<T: SerialTransport>(
    transport: &SharedTransport<T>,
    data: &[u8],
    written: &mut usize,
    pacing: WritePacing,
) -> Result<()> {
    let deadline = Instant::now() + pacing.timeout;
    while *written < data.len() {
        let result = {
            let mut guard = transport
                .lock()
                .map_err(|_| FrameError::TransportPoisoned)?;
            guard.write(&data[*written..])
        };
        match result {
            Ok(0) => return Err(TransportError::Closed.into()),
            Ok(n) => *written += n,
            Err(err) if err.is_transient() => {
                if Instant::now() >= deadline {
                    return Err(SessionError::WriteTimeout(pacing.timeout));
                }
                tokio::time::sleep(pacing.retry.max(Duration::from_millis(1))).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use serialframe_transport::sim::{SimConnector, SimPort};

    use super::*;

    fn session(policy: DelimiterPolicy) -> (SimConnector, SimPort, Session<SimConnector>) {
        let connector = SimConnector::new();
        let port = connector.add_port("sim0");
        let session = Session::new(
            connector.clone(),
            SessionConfig::new("sim0").with_policy(policy),
        );
        (connector, port, session)
    }

    #[tokio::test(start_paused = true)]
    async fn send_command_writes_encoded_bytes() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();

        let outcome = session.send_command("0x02 \"RD\" 3").await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.bytes_sent, vec![0x02, b'R', b'D', 0x03]);
        assert_eq!(port.take_outbound(), vec![0x02, b'R', b'D', 0x03]);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn send_command_with_bad_encoding_transmits_nothing() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();

        let outcome = session.send_command("1 2 999").await;
        assert_eq!(outcome.bytes_sent, Vec::<u8>::new());
        assert_eq!(
            outcome.error.as_deref(),
            Some("number out of range 0..=255: 999")
        );
        assert!(port.take_outbound().is_empty());

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn short_writes_are_resumed() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();
        port.set_write_limit(Some(2));

        let outcome = session.send_command("1 2 3 4 5").await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.bytes_sent, vec![1, 2, 3, 4, 5]);
        assert_eq!(port.take_outbound(), vec![1, 2, 3, 4, 5]);
        assert_eq!(port.write_calls(), 3);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_write_reports_closed() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();
        port.set_write_limit(Some(0));

        let outcome = session.send_command("1 2 3").await;
        assert_eq!(outcome.bytes_sent, Vec::<u8>::new());
        assert_eq!(outcome.error.as_deref(), Some("transport error: transport closed"));

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_keeps_sent_prefix() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();
        port.set_write_budget(Some(3));

        let outcome = session.send_command("1 2 3 4 5").await;
        assert_eq!(outcome.bytes_sent, vec![1, 2, 3]);
        assert_eq!(
            outcome.error.as_deref(),
            Some("transport error: transport I/O error: broken pipe")
        );
        assert_eq!(port.take_outbound(), vec![1, 2, 3]);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transient_write_errors_are_retried() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();
        port.fail_next_write(ErrorKind::WouldBlock);
        port.fail_next_write(ErrorKind::Interrupted);

        let outcome = session.send_command("\"OK\"").await;
        assert!(outcome.is_ok());
        assert_eq!(port.take_outbound(), b"OK".to_vec());
        assert_eq!(port.write_calls(), 3);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_port_times_out() {
        let connector = SimConnector::new();
        let port = connector.add_port("sim0");
        let mut session = Session::new(
            connector.clone(),
            SessionConfig::new("sim0").with_write_timeout(Duration::from_millis(100)),
        );
        session.open().unwrap();
        port.set_persistent_write_fault(Some(ErrorKind::WouldBlock));

        let outcome = tokio::time::timeout(Duration::from_secs(1), session.send_command("1 2 3"))
            .await
            .expect("send_command must give up on its own");
        assert_eq!(outcome.bytes_sent, Vec::<u8>::new());
        assert_eq!(
            outcome.error.as_deref(),
            Some("write timed out after 100ms")
        );
        let calls = port.write_calls();
        assert!(calls > 1 && calls < 20, "unexpected write attempts: {calls}");

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn send_command_while_closed() {
        let (_connector, _port, mut session) = session(DelimiterPolicy::default());
        let outcome = session.send_command("65").await;
        assert_eq!(outcome.error.as_deref(), Some("session is not open"));
    }

    #[tokio::test(start_paused = true)]
    async fn configure_applies_to_live_port() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        session.open().unwrap();

        let settings = LineSettings::from_raw(115_200, "E", 1, 7);
        session.configure(settings).unwrap();
        assert_eq!(port.applied_settings(), vec![LineSettings::default(), settings]);

        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn configure_while_closed_is_used_by_next_open() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        let settings = LineSettings::from_raw(19_200, "O", 2, 8);
        session.configure(settings).unwrap();
        assert!(port.applied_settings().is_empty());

        session.open().unwrap();
        assert_eq!(port.applied_settings(), vec![settings]);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn state_reports_engine_failure() {
        let connector = SimConnector::new();
        let port = connector.add_port("sim0");
        let mut session = Session::new(
            connector,
            SessionConfig::new("sim0").with_engine(serialframe_frame::EngineConfig {
                max_consecutive_io_errors: Some(2),
                ..Default::default()
            }),
        );
        session.open().unwrap();
        assert_eq!(session.state(), SessionState::Open);

        port.set_persistent_read_fault(Some(ErrorKind::BrokenPipe));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(session.state(), SessionState::Failed(_)));
        assert!(session.is_open());
        assert!(matches!(
            session.close().await,
            Err(SessionError::Engine(FrameError::Transport { .. }))
        ));
        assert!(!port.is_open());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn session_state_serializes() {
        assert_eq!(
            serde_json::to_string(&SessionState::Failed("gone".into())).unwrap(),
            r#"{"state":"failed","reason":"gone"}"#
        );
        assert_eq!(
            serde_json::to_string(&SessionState::Open).unwrap(),
            r#"{"state":"open"}"#
        );
    }

    #[test]
    fn open_outside_runtime_fails() {
        let (_connector, port, mut session) = session(DelimiterPolicy::default());
        assert!(matches!(session.open(), Err(SessionError::NoRuntime)));
        assert!(!port.is_open());
    }
}
