//! Errors raised while loading or validating a schema.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Element type not found: {0}")]
    UnknownElementType(String),

    #[error("Duplicate identifier in schema: {0}")]
    DuplicateId(String),

    #[error("Element type contains itself: {0}")]
    TypeCycle(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
