//! Serial port session controller.
//!
//! A [`Session`] binds one open transport to one framing engine. It owns the
//! lifecycle: open the port, forward configuration and delimiter changes,
//! hand out received messages, transmit encoded commands, and shut down in
//! order (engine first, port last).
//!
//! ```no_run
//! use serialframe_frame::DelimiterPolicy;
//! use serialframe_session::{Session, SessionConfig};
//! use serialframe_transport::SystemPorts;
//!
//! # async fn demo() -> serialframe_session::Result<()> {
//! let mut session = Session::new(SystemPorts, SessionConfig::new("/dev/ttyUSB0"));
//! session.set_delimiter(DelimiterPolicy::code(0x0A));
//! session.open()?;
//! let outcome = session.send_command("\"AT\" 0x0D 0x0A").await;
//! assert!(outcome.is_ok());
//! for msg in session.drain_received() {
//!     println!("{:?}", msg.data);
//! }
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod session;

pub use config::{SessionConfig, DEFAULT_WRITE_TIMEOUT};
pub use error::{Result, SessionError};
pub use session::{SendOutcome, Session, SessionState};
