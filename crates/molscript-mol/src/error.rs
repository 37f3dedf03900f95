//! Errors raised while building models

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("bond references atom {0}, model has {1} atoms")]
    BondOutOfRange(usize, usize),

    #[error("unknown element: {0}")]
    UnknownElement(String),

    #[error("unsupported substructure pattern: {0}")]
    Pattern(String),

    #[error("invalid model description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;
