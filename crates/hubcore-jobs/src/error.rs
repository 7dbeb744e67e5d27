#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no handler registered for job kind {0:?}")]
    UnknownKind(String),

    #[error("job payload did not match the shape its handler expects: {0}")]
    BadPayload(String),

    #[error(transparent)]
    Db(#[from] hubcore_db::DbError),

    #[error(transparent)]
    Storage(#[from] hubcore_storage::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl Error {
    /// Whether a retry could ever succeed. `UnknownKind`/`BadPayload` are
    /// programming or configuration errors fixed by a deploy, not by
    /// waiting and trying the same payload again; everything else
    /// (database hiccups, downstream I/O, a webhook endpoint returning a
    /// 5xx) is the transient case spec §7 expects to reschedule with
    /// backoff.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::UnknownKind(_) | Error::BadPayload(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
