use std::fmt::Display;

/// The errors that stop a benchmark run.
///
/// Both kinds are fatal: the command line interface prints the error and exits with status 1. A
/// store in an unknown state cannot produce trustworthy timings, so nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed option or an option value out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A failure reported by the key-value store.
    #[error("{context} error: {message}")]
    Backend { context: String, message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Wrap a store-specific error, `context` names the failing step (e.g. "open", "write").
    pub fn backend(context: impl Into<String>, err: impl Display) -> Self {
        Error::Backend {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
