use thiserror::Error;

/// Error surface of the capture pipeline's public API.
///
/// `TransportError` and `CaptureOverflow` from the design's error taxonomy are
/// deliberately absent here: the former is captured on a `NetworkEntry` and
/// never propagated out of the interceptor, the latter is an internal counter
/// observable only through `/api/status`.
#[derive(Debug, Error)]
pub enum SharpInspectError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sharpinspect is already initialized")]
    AlreadyInitialized,

    #[error("failed to bind DevTools server to {addr}: {source}")]
    PortInUse {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SharpInspectError>;
