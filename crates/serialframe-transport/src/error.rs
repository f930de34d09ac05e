/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// Failed to apply line settings to an open port.
    #[error("failed to configure {port}: {source}")]
    Configure {
        port: String,
        source: std::io::Error,
    },

    /// Failed to enumerate the ports available on this machine.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(std::io::Error),

    /// An I/O error occurred on the open port.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// The underlying I/O error kind, when there is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            TransportError::Open { source, .. } | TransportError::Configure { source, .. } => {
                Some(source.kind())
            }
            TransportError::Enumerate(source) | TransportError::Io(source) => Some(source.kind()),
            TransportError::Closed => None,
        }
    }

    /// Whether the error is a transient condition the next poll may not see.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.io_kind(),
            Some(
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        let err = TransportError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert!(err.is_transient());

        let err = TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(!err.is_transient());
        assert!(!TransportError::Closed.is_transient());
    }

    #[test]
    fn open_error_names_port() {
        let err = TransportError::Open {
            port: "COM7".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("failed to open COM7"));
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }
}
