//! The framing engine: one tokio task per open port.
//!
//! The task owns the [`Framer`] and waits on whichever fires first, in
//! priority order:
//!
//! 1. cancellation (leave immediately, residual bytes are dropped),
//! 2. a delimiter policy update (latest wins),
//! 3. the flush tick (ingest, then cut and emit messages),
//! 4. the ingest tick (drain the driver buffer between flushes).
//!
//! Messages go out through a bounded queue. A full queue stalls the engine
//! until the consumer drains it or the engine is cancelled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serialframe_transport::SerialTransport;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{FrameError, Result};
use crate::framer::Framer;
use crate::message::Message;
use crate::policy::DelimiterPolicy;

/// Outbound queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// How often the driver buffer is drained between flushes.
pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_millis(10);

/// Consecutive non-transient read failures tolerated before the engine fails.
pub const DEFAULT_MAX_CONSECUTIVE_IO_ERRORS: u32 = 5;

/// A transport shared between the engine and its session.
///
/// The lock is held for a single read, write or configure call.
pub type SharedTransport<T> = Arc<Mutex<T>>;

/// Configuration for the framing engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity of the outbound message queue. Default: 128.
    pub queue_capacity: usize,
    /// Ingest cadence between flushes. Default: 10 ms.
    pub read_interval: Duration,
    /// Consecutive read failures before the engine gives up.
    /// `None` tolerates failures forever. Default: 5.
    pub max_consecutive_io_errors: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_interval: DEFAULT_READ_INTERVAL,
            max_consecutive_io_errors: Some(DEFAULT_MAX_CONSECUTIVE_IO_ERRORS),
        }
    }
}

/// Lifecycle of the engine task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Running,
    /// Cancellation observed, tearing down.
    Stopping,
    /// Terminated on request. No further I/O.
    Stopped,
    /// Terminated on its own after a transport failure.
    Failed(String),
}

/// Start a framing engine for `transport` on the current tokio runtime.
pub fn spawn<T: SerialTransport>(
    transport: SharedTransport<T>,
    policy: DelimiterPolicy,
    config: EngineConfig,
) -> EngineHandle {
    let policy = policy.normalized();
    let port = match transport.lock() {
        Ok(guard) => guard.port_name().to_string(),
        Err(poisoned) => poisoned.get_ref().port_name().to_string(),
    };

    let (policy_tx, policy_rx) = watch::channel(policy);
    let (state_tx, state_rx) = watch::channel(EngineState::Running);
    let (out_tx, out_rx) = mpsc::channel(config.queue_capacity.max(1));
    let cancel = CancellationToken::new();

    let engine = FramingEngine {
        transport,
        port,
        framer: Framer::new(),
        policy,
        policy_rx,
        out: out_tx,
        cancel: cancel.clone(),
        state: state_tx,
        config,
        io_failures: 0,
    };

    EngineHandle {
        policy_tx: Some(policy_tx),
        messages: out_rx,
        cancel,
        state: state_rx,
        task: Some(tokio::spawn(engine.run())),
    }
}

struct FramingEngine<T> {
    transport: SharedTransport<T>,
    port: String,
    framer: Framer,
    policy: DelimiterPolicy,
    policy_rx: watch::Receiver<DelimiterPolicy>,
    out: mpsc::Sender<Message>,
    cancel: CancellationToken,
    state: watch::Sender<EngineState>,
    config: EngineConfig,
    io_failures: u32,
}

impl<T: SerialTransport> FramingEngine<T> {
    async fn run(mut self) -> Result<()> {
        let mut flush = ticker(self.policy.cadence());
        let mut ingest = ticker(self.config.read_interval);
        let mut accepting_policy = true;

        info!(port = %self.port, policy = %self.policy, "framing engine running");

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                changed = self.policy_rx.changed(), if accepting_policy => match changed {
                    Ok(()) => {
                        let next = self.policy_rx.borrow_and_update().normalized();
                        self.apply_policy(next, &mut flush);
                    }
                    // The session stopped accepting updates; shutdown follows.
                    Err(_) => accepting_policy = false,
                },
                _ = flush.tick() => {
                    if let Err(err) = self.ingest() {
                        break Err(err);
                    }
                    if !self.flush().await {
                        break Ok(());
                    }
                }
                _ = ingest.tick() => {
                    if let Err(err) = self.ingest() {
                        break Err(err);
                    }
                }
            }
        };

        match &outcome {
            Ok(()) => {
                self.state.send_replace(EngineState::Stopping);
                debug!(
                    port = %self.port,
                    dropped = self.framer.buffered(),
                    "framing engine stopping"
                );
                self.state.send_replace(EngineState::Stopped);
                info!(port = %self.port, "framing engine stopped");
            }
            Err(err) => {
                self.state.send_replace(EngineState::Failed(err.to_string()));
                warn!(port = %self.port, error = %err, "framing engine failed");
            }
        }
        outcome
    }

    fn apply_policy(&mut self, next: DelimiterPolicy, flush: &mut Interval) {
        if next == self.policy {
            return;
        }
        debug!(
            port = %self.port,
            from = %self.policy,
            to = %next,
            buffered = self.framer.buffered(),
            "delimiter policy changed"
        );
        let restart = next.cadence() != self.policy.cadence();
        self.policy = next;
        if restart {
            *flush = ticker(next.cadence());
        }
    }

    /// Move whatever the driver holds into the framer.
    fn ingest(&mut self) -> Result<()> {
        let result = {
            let mut transport = self
                .transport
                .lock()
                .map_err(|_| FrameError::TransportPoisoned)?;
            transport.read_available(self.framer.buffer_mut())
        };

        match result {
            Ok(n) => {
                self.io_failures = 0;
                if n > 0 {
                    trace!(port = %self.port, bytes = n, buffered = self.framer.buffered(), "ingested");
                }
                Ok(())
            }
            Err(err) if err.is_transient() => Ok(()),
            Err(err) => {
                self.io_failures = self.io_failures.saturating_add(1);
                warn!(
                    port = %self.port,
                    error = %err,
                    failures = self.io_failures,
                    "transport read failed"
                );
                match self.config.max_consecutive_io_errors {
                    Some(limit) if self.io_failures >= limit => Err(FrameError::Transport {
                        failures: self.io_failures,
                        source: err,
                    }),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Cut and emit. Returns `false` when the engine should stop.
    async fn flush(&mut self) -> bool {
        let messages = self.framer.flush(&self.policy);
        if !messages.is_empty() {
            debug!(port = %self.port, policy = %self.policy, count = messages.len(), "flush");
        }
        for msg in messages {
            if !self.emit(msg).await {
                return false;
            }
        }
        true
    }

    async fn emit(&mut self, msg: Message) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.out.send(msg) => {
                if sent.is_err() {
                    debug!(port = %self.port, "message consumer gone");
                }
                sent.is_ok()
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Control side of a running framing engine.
///
/// Dropping the handle cancels the engine without waiting for it.
#[derive(Debug)]
pub struct EngineHandle {
    policy_tx: Option<watch::Sender<DelimiterPolicy>>,
    messages: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    state: watch::Receiver<EngineState>,
    task: Option<JoinHandle<Result<()>>>,
}

impl EngineHandle {
    /// Replace the delimiter policy. Never blocks; an update the engine has
    /// not observed yet is overwritten.
    ///
    /// Returns `false` once the handle has stopped accepting updates.
    pub fn set_policy(&self, policy: DelimiterPolicy) -> bool {
        match &self.policy_tx {
            Some(tx) => {
                tx.send_replace(policy.normalized());
                true
            }
            None => false,
        }
    }

    /// Remove every queued message, oldest first, without waiting.
    pub fn drain(&mut self) -> Vec<Message> {
        let mut out = Vec::new();
        while let Ok(msg) = self.messages.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Wait for the next message. `None` once the engine is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Whether the engine task has completed, for whatever reason.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop accepting policy updates, cancel the engine and wait until it has
    /// completed. Returns the engine's own failure, if it had one.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.policy_tx = None;
        self.cancel.cancel();

        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(err) => Err(FrameError::EngineAborted(err.to_string())),
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use serialframe_transport::sim::{SimConnector, SimPort};
    use serialframe_transport::{LineSettings, PortConnector};

    use super::*;

    fn sim() -> (SimPort, SharedTransport<serialframe_transport::sim::SimTransport>) {
        let connector = SimConnector::new();
        let port = connector.add_port("sim0");
        let transport = connector
            .open("sim0", &LineSettings::default())
            .expect("sim port should open");
        (port, Arc::new(Mutex::new(transport)))
    }

    async fn sleep_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn timed_bursts_carry_continuation() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 100 },
            EngineConfig::default(),
        );

        port.push_inbound(b"hello");
        sleep_ms(150).await;
        port.push_inbound(b" world");
        sleep_ms(100).await;
        // Quiet window at t=300 ends the burst.
        sleep_ms(100).await;
        port.push_inbound(b"again");
        sleep_ms(100).await;

        assert_eq!(
            engine.drain(),
            vec![
                Message::new(false, &b"hello"[..]),
                Message::new(true, &b" world"[..]),
                Message::new(false, &b"again"[..]),
            ]
        );
        engine.shutdown().await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn code_delimited_splits_and_continues() {
        let (port, transport) = sim();
        let mut engine = spawn(transport, DelimiterPolicy::code(0x0A), EngineConfig::default());

        port.push_inbound(b"one\ntw");
        sleep_ms(200).await;
        port.push_inbound(b"o\n");
        sleep_ms(150).await;

        assert_eq!(
            engine.drain(),
            vec![
                Message::new(false, &b"one\n"[..]),
                Message::new(false, &b"tw"[..]),
                Message::new(true, &b"o\n"[..]),
            ]
        );
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn policy_switch_keeps_buffered_bytes() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 1000 },
            EngineConfig::default(),
        );

        port.push_inbound(b"ab|cd");
        sleep_ms(50).await;
        assert!(engine.set_policy(DelimiterPolicy::code(u16::from(b'|'))));
        sleep_ms(200).await;

        assert_eq!(
            engine.drain(),
            vec![
                Message::new(false, &b"ab|"[..]),
                Message::new(false, &b"cd"[..]),
            ]
        );
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn latest_policy_update_wins() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 1000 },
            EngineConfig::default(),
        );

        engine.set_policy(DelimiterPolicy::code(u16::from(b',')));
        engine.set_policy(DelimiterPolicy::code(u16::from(b';')));
        port.push_inbound(b"a,b;c");
        sleep_ms(200).await;

        assert_eq!(
            engine.drain(),
            vec![
                Message::new(false, &b"a,b;"[..]),
                Message::new(false, &b"c"[..]),
            ]
        );
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded_under_backpressure() {
        let (port, transport) = sim();
        let config = EngineConfig {
            queue_capacity: 1,
            ..EngineConfig::default()
        };
        let mut engine = spawn(transport, DelimiterPolicy::Timed { interval_ms: 20 }, config);

        port.push_inbound(b"a");
        sleep_ms(30).await;
        port.push_inbound(b"b");
        sleep_ms(30).await;

        // The engine is stuck emitting "b" into the full queue.
        engine.shutdown().await.unwrap();
        assert_eq!(engine.drain(), vec![Message::new(false, &b"a"[..])]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_io_after_shutdown() {
        let (port, transport) = sim();
        let mut engine = spawn(transport, DelimiterPolicy::default(), EngineConfig::default());

        sleep_ms(50).await;
        engine.shutdown().await.unwrap();
        assert!(engine.is_finished());
        assert!(!engine.set_policy(DelimiterPolicy::code(1)));

        let reads = port.read_calls();
        port.push_inbound(b"late");
        sleep_ms(500).await;
        assert_eq!(port.read_calls(), reads);
        assert!(engine.drain().is_empty());
        assert_eq!(port.pending_inbound(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_read_errors_are_ignored() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 100 },
            EngineConfig {
                max_consecutive_io_errors: Some(1),
                ..EngineConfig::default()
            },
        );

        port.fail_next_read(ErrorKind::WouldBlock);
        port.fail_next_read(ErrorKind::Interrupted);
        port.push_inbound(b"ok");
        sleep_ms(150).await;

        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.drain(), vec![Message::new(false, &b"ok"[..])]);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_read_errors_fail_the_engine() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::default(),
            EngineConfig {
                max_consecutive_io_errors: Some(3),
                ..EngineConfig::default()
            },
        );

        port.set_persistent_read_fault(Some(ErrorKind::BrokenPipe));
        sleep_ms(100).await;

        assert!(engine.is_finished());
        assert!(matches!(
            engine.state(),
            EngineState::Failed(reason) if reason.contains("3 consecutive")
        ));
        let err = engine.shutdown().await.unwrap_err();
        assert!(matches!(err, FrameError::Transport { failures: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_tolerance_recovers() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 100 },
            EngineConfig {
                max_consecutive_io_errors: None,
                ..EngineConfig::default()
            },
        );

        port.set_persistent_read_fault(Some(ErrorKind::BrokenPipe));
        sleep_ms(250).await;
        port.set_persistent_read_fault(None);
        port.push_inbound(b"back");
        sleep_ms(100).await;

        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.drain(), vec![Message::new(false, &b"back"[..])]);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_falls_back_to_default() {
        let (port, transport) = sim();
        let mut engine = spawn(
            transport,
            DelimiterPolicy::Timed { interval_ms: 0 },
            EngineConfig::default(),
        );

        port.push_inbound(b"x");
        sleep_ms(140).await;
        assert!(engine.drain().is_empty());
        sleep_ms(20).await;
        assert_eq!(engine.drain(), vec![Message::new(false, &b"x"[..])]);
        engine.shutdown().await.unwrap();
    }
}
