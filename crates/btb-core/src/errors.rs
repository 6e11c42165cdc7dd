/// Core error type for the relay.
///
/// Adapter crates map their specific failures into this type so the
/// dispatcher can turn them into user-facing messages consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The per-user API token was rejected by the remote (401).
    #[error("invalid or expired API token")]
    Auth,

    /// Connectivity failure or timeout talking to the remote.
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with an unexpected non-2xx status.
    #[error("remote server error: status {status}")]
    Server { status: u16 },

    /// The remote note no longer exists (404 on update).
    #[error("remote note not found")]
    NotFound,

    /// Stored ciphertext could not be opened (corrupt row or rotated key).
    /// Callers degrade this to "not configured" rather than crashing.
    #[error("credential decryption failed: {0}")]
    Decryption(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
