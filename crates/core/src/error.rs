use crate::lifecycle::Collection;
use crate::permissions::{Capability, Role};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rejections and failures surfaced by the transition executor.
///
/// `PermissionDenied`, `IllegalTransition` and `ValidationFailed` are never retried.
/// `StaleState` is recoverable: re-read the entity and retry at most once.
/// `Storage` is transient and may be retried with backoff by the calling layer.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("permission denied: role {role} lacks capability {capability}")]
    PermissionDenied { role: Role, capability: Capability },

    #[error("illegal transition on {collection}: {from} -> {to}")]
    IllegalTransition {
        collection: Collection,
        from: String,
        to: String,
    },

    #[error("stale state: expected {expected}, store holds {actual}")]
    StaleState { expected: String, actual: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("{collection} entry {id} not found")]
    NotFound { collection: Collection, id: Uuid },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type TransitionResult<T> = std::result::Result<T, TransitionError>;

/// Wire-level classification of a failure, shared by the REST surface and clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    IllegalTransition,
    StaleState,
    ValidationFailed,
    NotFound,
    Storage,
    BadRequest,
}

impl ErrorKind {
    /// Transient failures a caller may retry with backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Storage)
    }
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            TransitionError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            TransitionError::StaleState { .. } => ErrorKind::StaleState,
            TransitionError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            TransitionError::NotFound { .. } => ErrorKind::NotFound,
            TransitionError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_transient()
    }
}

impl From<clinic_types::TypeError> for TransitionError {
    fn from(err: clinic_types::TypeError) -> Self {
        TransitionError::ValidationFailed(err.to_string())
    }
}
