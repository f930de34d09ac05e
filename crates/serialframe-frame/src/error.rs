use serialframe_transport::TransportError;

/// Errors that terminate the framing engine.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The transport kept failing past the configured tolerance.
    #[error("transport failed after {failures} consecutive errors: {source}")]
    Transport {
        failures: u32,
        source: TransportError,
    },

    /// The transport lock was poisoned by a panicking holder.
    #[error("transport lock poisoned")]
    TransportPoisoned,

    /// The engine task panicked or was aborted before completing.
    #[error("framing engine aborted: {0}")]
    EngineAborted(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
