//! Error taxonomy shared by every module of the crate.

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport failure or an unexpected server answer.
    #[error("network error: {0}")]
    Network(String),

    /// Missing, expired or rejected auth token. Recovered by logging in again.
    #[error("not authorized: {0}")]
    Auth(String),

    /// Referenced mail or label id is not known.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Input rejected before (or by) the server.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Local SQLite cache failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// OS keyring failure.
    #[error("session store error: {0}")]
    Session(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn mail_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "mail",
            id: id.into(),
        }
    }

    pub fn label_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "label",
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
