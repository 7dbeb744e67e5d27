//! The eight error kinds of the write-pipeline boundary. Every internal
//! crate error gets mapped into one of these before it reaches a
//! transport front-end; nothing downstream of this module should need to
//! know about `git2::Error`, `sqlx::Error`, or the like.

/// Propagation policy lives with the front-ends: `AuthFailure`/`NotFound`
/// never leak detail, `ProtectionViolation`/`ValidationError`/`Conflict`
/// carry a message safe to put on the Git side-band, `Transient` is
/// retryable, `Fatal` means an operator needs to look.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("authentication required")]
    AuthFailure,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found")]
    NotFound,

    #[error("protection violation: {0}")]
    ProtectionViolation(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<hubcore_storage::Error> for PipelineError {
    fn from(e: hubcore_storage::Error) -> Self {
        use hubcore_storage::Error as E;
        match e {
            E::NotFound(_) => Self::NotFound,
            E::AlreadyExists(_) => Self::Conflict(e.to_string()),
            E::InvalidRefName(_) => Self::ValidationError(e.to_string()),
            E::Locked(_) => Self::Transient(e.to_string()),
            E::Io(_) => Self::Transient(e.to_string()),
            E::Git(_) => Self::Fatal(e.to_string()),
        }
    }
}

impl From<hubcore_git::Error> for PipelineError {
    fn from(e: hubcore_git::Error) -> Self {
        use hubcore_git::Error as E;
        match e {
            E::MalformedRequest(msg) => Self::ValidationError(msg),
            E::Rejected(msg) => Self::Conflict(msg),
            E::Storage(inner) => inner.into(),
            E::Spawn(_) | E::Io(_) => Self::Transient(e.to_string()),
            E::SubprocessFailed(_) | E::Git(_) => Self::Fatal(e.to_string()),
        }
    }
}

impl From<hubcore_db::DbError> for PipelineError {
    fn from(e: hubcore_db::DbError) -> Self {
        use hubcore_db::DbError as E;
        match e {
            E::NotFound => Self::NotFound,
            E::Conflict(msg) => Self::Conflict(msg),
            E::Internal(msg) => Self::Fatal(msg),
            E::Sqlx(_) => Self::Transient(e.to_string()),
        }
    }
}

impl From<git2::Error> for PipelineError {
    fn from(e: git2::Error) -> Self {
        Self::Fatal(e.to_string())
    }
}
