use thiserror::Error;

pub type FloeResult<T> = std::result::Result<T, FloeError>;
pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FloeError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    ComputeError(String),
    #[error("{0}")]
    FieldNotFound(String),
    #[error("{0}")]
    InternalError(String),
    #[error("FloeError::DatasetNotFound {path}: {source}")]
    DatasetNotFound { path: String, source: GenericError },
    #[error("{0:?}")]
    ArrowError(#[from] arrow::error::ArrowError),
    #[error("{0:?}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    External(GenericError),
}
