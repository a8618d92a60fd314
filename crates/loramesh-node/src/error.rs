//! Errors from the device runtime.

use loramesh_router::RouterError;

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Router(#[from] RouterError),
}
