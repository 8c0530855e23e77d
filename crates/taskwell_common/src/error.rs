//! Error taxonomy shared between the store, the lifecycle, and the daemon.

/// Errors surfaced by the store and lifecycle layers.
///
/// The daemon maps these onto HTTP status codes. Messages carried here are
/// safe to show to clients; anything sensitive stays in the tracing log at
/// the point of failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced row does not exist. The payload names the entity
    /// ("Update", "Task", ...) for the client-facing detail string.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A precondition on the current state failed (illegal transition,
    /// rollback disallowed, duplicate account).
    #[error("{0}")]
    Conflict(String),

    /// The request itself is invalid (duplicate registration and the like).
    #[error("{0}")]
    BadRequest(String),

    /// Missing, malformed, or expired bearer credential.
    #[error("Could not validate credentials")]
    Unauthenticated,

    /// The credential is valid but does not match the requested resource.
    #[error("Access denied: User ID mismatch")]
    Forbidden,

    /// SQLite failure. Never shown to clients verbatim.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Catch-all for unexpected failures. The message must already be a
    /// generic, client-safe string.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
