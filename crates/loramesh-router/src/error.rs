//! Errors from the reliable delivery layer.

/// Errors surfaced by the router stack.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("substrate transmit failed: {0}")]
    Transmit(String),

    #[error("routing control record codec error: {0}")]
    Codec(String),

    #[error("no request is currently being processed")]
    NoCurrentRequest,

    #[error("routing requests are not serviced")]
    ReplyUnsupported,
}
