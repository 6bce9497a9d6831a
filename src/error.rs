use std::result::Result as StdResult;

pub type Result<T> = StdResult<T, Error>;

/// Error taxonomy surfaced across service boundaries.
///
/// The first five variants carry contract meaning (they map to specific REST
/// statuses); everything else is an internal failure reported as 500.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad arguments")]
    BadArguments,

    #[error("update already running")]
    AlreadyExists,

    #[error("unauthorized")]
    Unauthorized,

    #[error("phrase too large")]
    PhraseTooLarge,

    #[error("operation canceled")]
    Canceled,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("upstream http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(anyhow::anyhow!(msg.into()))
    }
}
