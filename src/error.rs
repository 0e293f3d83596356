//! Error taxonomy shared by every workflow operation
//!
//! Guard denials carry the reason as written for the end user. The `Display`
//! output of the taxonomy variants is exactly that reason so callers can surface
//! it without reformatting.

/// Fieldless discriminant of [`WorkflowError`], handy for matching and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidState,
    Conflict,
    Authorization,
    NotFound,
    Storage,
    Codec,
    Config,
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode or decode a stored record: {0}")]
    Codec(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Authorization(reason.into())
    }
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Codec(_) => ErrorKind::Codec,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Only conflicts may be retried, and only after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// The human readable reason without any prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::Validation(r)
            | Self::InvalidState(r)
            | Self::Conflict(r)
            | Self::Authorization(r)
            | Self::NotFound(r) => r.clone(),
            other => other.to_string(),
        }
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for WorkflowError {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<minicbor::decode::Error> for WorkflowError {
    fn from(err: minicbor::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
