use serialframe_frame::FrameError;
use serialframe_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `open` was called on a session that is already open.
    #[error("session is already open on {0}")]
    AlreadyOpen(String),

    /// The operation needs an open session.
    #[error("session is not open")]
    NotOpen,

    /// No port was selected before `open`.
    #[error("no serial port selected")]
    NoPort,

    /// The session must be opened from within a tokio runtime.
    #[error("no tokio runtime available to run the framing engine")]
    NoRuntime,

    /// The port kept refusing bytes until the write deadline passed.
    #[error("write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),

    /// The port could not be opened.
    #[error("open failed: {0}")]
    Open(#[source] TransportError),

    /// Transport-level error on an open port.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The framing engine failed or was aborted.
    #[error("engine error: {0}")]
    Engine(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
