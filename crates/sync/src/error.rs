use clinic_core::{ErrorKind, TransitionError};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("server rejected request ({kind:?}): {message}")]
    Remote { kind: ErrorKind, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("entity {0} is not in the local view")]
    NotInView(Uuid),
    #[error("view is closed")]
    Closed,
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Classification of a rejection, when the executor produced one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SyncError::Transition(e) => Some(e.kind()),
            SyncError::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.kind() == Some(ErrorKind::StaleState)
    }

    /// Storage and transport failures; worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            other => other.kind().is_some_and(ErrorKind::is_transient),
        }
    }
}
