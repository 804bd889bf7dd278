use std::fmt;

/// Errors surfaced by a `Store` implementation.
///
/// Every call carries a deadline; `DeadlineExceeded` is the only retryable
/// variant and the caller (the Token Service) decides retry policy — the
/// store itself never retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("call deadline exceeded")]
    DeadlineExceeded,

    #[error("batch insert failed: {message}")]
    BatchInsertFailed { message: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("internal storage error: {message}")]
    Internal { message: String },
}

impl StoreError {
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn batch_insert_failed(message: impl Into<String>) -> Self {
        Self::BatchInsertFailed {
            message: message.into(),
        }
    }

    /// `true` for transport/timeout failures the caller may treat as
    /// transient; `false` for `NotFound`, which is a normal outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Connection { .. })
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::NotFound,
            Self::DeadlineExceeded => ErrorCategory::Timeout,
            Self::BatchInsertFailed { .. } => ErrorCategory::Write,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    Timeout,
    Write,
    Infrastructure,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Timeout => write!(f, "timeout"),
            Self::Write => write!(f, "write"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
