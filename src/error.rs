use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("channel closed prematurely: {0}")]
    ChannelClosed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task error: {0}")]
    Task(String),
}
