use thiserror::Error;
use std::io;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Render failure: {0}")]
    RenderFailure(String),

    #[error("Render timed out: {0}")]
    RenderTimeout(String),

    #[error("Batch timed out: {0}")]
    BatchTimeout(String),

    #[error("Match operation timed out: {0}")]
    MatchTimeout(String),

    #[error("Comparison failed: {source}")]
    ComparisonFailed {
        #[source]
        source: Box<Error>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Thread join error: {0}")]
    ThreadJoin(#[from] JoinError),

    #[error("Async operation error: {0}")]
    AsyncError(String),
}

// Type alias for Result
pub type Result<T> = std::result::Result<T, Error>;

// Helper functions for common error conversions
impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn render<S: Into<String>>(msg: S) -> Self {
        Error::RenderFailure(msg.into())
    }

    pub fn render_timeout<S: Into<String>>(msg: S) -> Self {
        Error::RenderTimeout(msg.into())
    }

    pub fn async_err<S: Into<String>>(msg: S) -> Self {
        Error::AsyncError(msg.into())
    }

    pub fn comparison_failed(cause: Error) -> Self {
        Error::ComparisonFailed {
            source: Box::new(cause),
        }
    }

    /// Render problems are retried by the batch scorer; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RenderFailure(_) | Error::RenderTimeout(_))
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::AsyncError(format!("Thread pool build failed: {}", err))
    }
}

impl From<sys_info::Error> for Error {
    fn from(err: sys_info::Error) -> Self {
        Error::AsyncError(err.to_string())
    }
}
