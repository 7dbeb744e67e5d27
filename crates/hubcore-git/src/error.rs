#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn git subprocess: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git subprocess failed: {0}")]
    SubprocessFailed(String),

    #[error("malformed receive-pack request: {0}")]
    MalformedRequest(String),

    #[error("ref update rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(#[from] hubcore_storage::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git2 error: {0}")]
    Git(#[from] git2::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
