use thiserror::Error;

#[derive(Debug, Error)]
pub enum KdiError {
    #[error("a match key is required to resolve the owning asset")]
    MissingMatchKey,

    #[error("`{key}` holds a list and cannot be used as a match key")]
    UnsupportedMatchKey { key: String },

    #[error("port value {value:?} is not an integer")]
    InvalidPort { value: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize KDI document: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type KdiResult<T> = Result<T, KdiError>;
