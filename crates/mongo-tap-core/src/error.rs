//! Domain error types for the sniffing proxy.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Invalid address format.
    #[error("invalid address format: {0} (expected 'host:port')")]
    InvalidAddress(String),

    /// Frame-size ceiling must be nonzero.
    #[error("max_frame_size must be at least {min}, got {got}")]
    InvalidFrameSize { got: usize, min: usize },

    /// Parser queue depth must be nonzero.
    #[error("queue_chunks must be at least 1")]
    InvalidQueueDepth,
}

/// Errors that occur during proxy operation.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// TCP/IO connection error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Upstream MongoDB server could not be reached.
    #[error("upstream {address} unavailable: {message}")]
    UpstreamUnavailable { address: String, message: String },

    /// Shutdown signal received.
    #[error("proxy shutting down")]
    Shutdown,
}

/// Errors raised while decoding the MongoDB wire format.
///
/// Errors produced by frame reassembly (bad header length, oversized frame)
/// terminate the parser direction; errors produced while decoding a
/// reassembled frame body are frame-local and only cost that frame's event.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Stream ended in the middle of a frame.
    #[error("short frame: stream ended with {remaining} undecoded bytes")]
    ShortFrame { remaining: usize },

    /// Header `message_length` below the 16-byte header size.
    #[error("invalid message length {0}")]
    BadMessageLength(i32),

    /// Frame exceeds the configured ceiling.
    #[error("frame of {length} bytes exceeds maximum {max}")]
    FrameTooLarge { length: usize, max: usize },

    /// Opcode not in the recognized tag set.
    #[error("unknown op code {0}")]
    UnknownOpCode(i32),

    /// OP_MSG section kind other than 0 or 1.
    #[error("unknown section kind {0}")]
    UnknownSectionKind(u8),

    /// C-string ran to the end of the frame without a NUL.
    #[error("c-string missing NUL terminator")]
    UnterminatedCString,

    /// C-string bytes are not valid UTF-8.
    #[error("c-string is not valid UTF-8")]
    InvalidCString,

    /// BSON document length below the 5-byte minimum.
    #[error("document length {0} below minimum")]
    DocumentTooShort(i32),

    /// Frame body exhausted while a field was still expected.
    #[error("truncated frame while reading {0}")]
    Truncated(&'static str),

    /// BSON decoder rejected a document body.
    #[error("bson decode failed: {0}")]
    Bson(#[from] bson::de::Error),

    /// I/O failure surfaced through the codec.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for wire decoding.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Whether an I/O error is the peer closing the connection.
///
/// Peer close is a clean shutdown for a transparent proxy, not a fault;
/// callers use this to skip error logging and error events.
#[must_use]
pub fn is_peer_close(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidAddress("nonsense".to_string());
        assert!(err.to_string().contains("nonsense"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::FrameTooLarge {
            length: 1 << 30,
            max: 48 << 20,
        };
        assert!(err.to_string().contains("exceeds maximum"));

        let err = DecodeError::UnknownOpCode(9999);
        assert!(err.to_string().contains("9999"));
    }

    #[test]
    fn test_proxy_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let proxy_err: ProxyError = io_err.into();
        assert!(matches!(proxy_err, ProxyError::Connection(_)));
    }

    #[test]
    fn test_peer_close_classification() {
        for kind in [
            std::io::ErrorKind::UnexpectedEof,
            std::io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::NotConnected,
        ] {
            assert!(is_peer_close(&std::io::Error::new(kind, "peer close")));
        }
        assert!(!is_peer_close(&std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "not a peer close"
        )));
    }
}
