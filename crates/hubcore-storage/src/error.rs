use std::path::PathBuf;

/// All errors produced by the repository store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository not found: {0}")]
    NotFound(String),

    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("lock held by another writer: {0}")]
    Locked(String),

    #[error("git error: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound(id.to_string())
    }

    pub fn already_exists(id: impl std::fmt::Display) -> Self {
        Self::AlreadyExists(id.to_string())
    }

    pub fn invalid_ref_name(name: impl Into<String>) -> Self {
        Self::InvalidRefName(name.into())
    }

    pub fn git(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Git(Box::new(err))
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }
}
