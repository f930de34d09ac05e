use std::time::Duration;

use serialframe_frame::{DelimiterPolicy, Message};
use serialframe_session::{Session, SessionConfig, SessionError, SessionState};
use serialframe_transport::sim::{SimConnector, SimPort};
use serialframe_transport::TransportError;

fn setup() -> (SimConnector, SimPort, Session<SimConnector>) {
    let connector = SimConnector::new();
    let port = connector.add_port("/dev/ttySIM0");
    let session = Session::new(connector.clone(), SessionConfig::new("/dev/ttySIM0"));
    (connector, port, session)
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn open_receive_close() {
    let (_connector, port, mut session) = setup();
    assert_eq!(session.state(), SessionState::Closed);

    session.open().expect("open should succeed");
    assert_eq!(session.state(), SessionState::Open);
    assert!(port.is_open());

    port.push_inbound(b"ping");
    sleep_ms(200).await;
    assert_eq!(
        session.drain_received(),
        vec![Message::new(false, &b"ping"[..])]
    );
    assert!(session.drain_received().is_empty());

    session.close().await.expect("close should succeed");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!port.is_open());
}

#[tokio::test(start_paused = true)]
async fn opening_twice_fails() {
    let (_connector, port, mut session) = setup();
    session.open().unwrap();

    let err = session.open().unwrap_err();
    assert!(matches!(err, SessionError::AlreadyOpen(ref name) if name == "/dev/ttySIM0"));
    assert_eq!(port.open_count(), 1);

    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn open_failure_leaves_session_closed() {
    let (connector, _port, mut session) = setup();
    connector.unplug("/dev/ttySIM0");

    let err = session.open().unwrap_err();
    assert!(matches!(err, SessionError::Open(TransportError::Open { .. })));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_open());
}

#[tokio::test(start_paused = true)]
async fn open_without_port() {
    let mut session = Session::new(SimConnector::new(), SessionConfig::default());
    assert!(matches!(session.open(), Err(SessionError::NoPort)));
}

#[tokio::test(start_paused = true)]
async fn busy_port_is_refused() {
    let (connector, _port, mut first) = setup();
    first.open().unwrap();

    let mut second = Session::new(connector, SessionConfig::new("/dev/ttySIM0"));
    assert!(matches!(second.open(), Err(SessionError::Open(_))));

    first.close().await.unwrap();
    second.open().expect("port is free after close");
    second.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent() {
    let (_connector, _port, mut session) = setup();
    session.close().await.unwrap();

    session.open().unwrap();
    session.close().await.unwrap();
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reopen_after_close() {
    let (_connector, port, mut session) = setup();
    session.open().unwrap();
    session.close().await.unwrap();
    session.open().unwrap();

    assert_eq!(port.open_count(), 2);
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delimiter_set_while_closed_applies_on_open() {
    let (_connector, port, mut session) = setup();
    session.set_delimiter(DelimiterPolicy::code(0x0A));
    assert_eq!(session.config().policy, DelimiterPolicy::code(0x0A));

    session.open().unwrap();
    port.push_inbound(b"a\nb");
    sleep_ms(200).await;

    assert_eq!(
        session.drain_received(),
        vec![
            Message::new(false, &b"a\n"[..]),
            Message::new(false, &b"b"[..]),
        ]
    );
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delimiter_change_while_open_keeps_pending_bytes() {
    let (_connector, port, mut session) = setup();
    session.set_delimiter(DelimiterPolicy::Timed { interval_ms: 1000 });
    session.open().unwrap();

    port.push_inbound(b"x;y");
    sleep_ms(100).await;
    session.set_delimiter(DelimiterPolicy::code(u16::from(b';')));
    sleep_ms(200).await;

    assert_eq!(
        session.drain_received(),
        vec![
            Message::new(false, &b"x;"[..]),
            Message::new(false, &b"y"[..]),
        ]
    );
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn nothing_is_received_after_close() {
    let (_connector, port, mut session) = setup();
    session.open().unwrap();
    port.push_inbound(b"unflushed");
    sleep_ms(50).await;

    session.close().await.unwrap();
    port.push_inbound(b"more");
    sleep_ms(500).await;

    assert!(session.drain_received().is_empty());
    assert!(session.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_an_open_session_releases_the_port() {
    let (_connector, port, mut session) = setup();
    session.open().unwrap();
    drop(session);

    sleep_ms(50).await;
    assert!(!port.is_open());
}

#[tokio::test(start_paused = true)]
async fn list_ports_uses_connector() {
    let (connector, _port, session) = setup();
    connector.add_port("/dev/ttySIM1");
    assert_eq!(
        session.list_ports().unwrap(),
        vec!["/dev/ttySIM0".to_string(), "/dev/ttySIM1".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn set_port_selects_next_open() {
    let (connector, port0, mut session) = setup();
    let port1 = connector.add_port("/dev/ttySIM1");

    session.set_port("/dev/ttySIM1");
    assert_eq!(session.port(), Some("/dev/ttySIM1"));
    session.open().unwrap();
    assert!(port1.is_open());
    assert!(!port0.is_open());
    session.close().await.unwrap();
}
