use thiserror::Error;

pub type Result<T> = std::result::Result<T, InferError>;

#[derive(Error, Debug)]
pub enum InferError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid project root: {0}")]
    InvalidRoot(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Inference cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
