use clinic_core::{ErrorKind, TransitionError};

/// A failure as it travels over the wire: a classification, an HTTP status and a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// HTTP status for each failure class.
pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::PermissionDenied => 403,
        ErrorKind::IllegalTransition => 409,
        ErrorKind::StaleState => 412,
        ErrorKind::ValidationFailed => 422,
        ErrorKind::NotFound => 404,
        ErrorKind::Storage => 503,
        ErrorKind::BadRequest => 400,
    }
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: status_for(kind),
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    /// Missing or wrong credentials. Reported as a permission failure with status 401.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: 401,
            kind: ErrorKind::PermissionDenied,
            message: message.into(),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::new(err.kind(), err.to_string())
    }
}

impl From<clinic_types::TypeError> for ApiError {
    fn from(err: clinic_types::TypeError) -> Self {
        ApiError::validation(err.to_string())
    }
}
