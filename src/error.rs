//! Error types for the line-set solver

use thiserror::Error;

/// Main error type for line-set operations
#[derive(Error, Debug)]
pub enum LineSetError {
    #[error("Node '{0}' not found in line set")]
    NodeNotFound(String),

    #[error("Line '{0}' not found in line set")]
    LineNotFound(String),

    #[error("Line type '{0}' not found in registry")]
    LineTypeNotFound(String),

    #[error("Duplicate name '{0}' already exists")]
    DuplicateName(String),

    #[error("Line type '{0}' is already registered")]
    DuplicateLineType(String),

    #[error("Invalid line type name '{0}' (expected manufacturer.product[.size])")]
    InvalidLineTypeName(String),

    #[error("Node '{0}' has more than one lower line")]
    MultipleLowerLines(String),

    #[error("Line network contains a cycle through node '{0}'")]
    CycleDetected(String),

    #[error("Line '{0}' is not connected to any lower attachment point")]
    Disconnected(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("No 'main' lower attachment point")]
    MissingMainAttachment,

    #[error("Singular sag matrix at line '{0}'")]
    SingularSagMatrix(String),

    #[error("Force not computed for line '{0}' - run recalc() first")]
    ForceNotComputed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Table error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Result type for line-set operations
pub type LineSetResult<T> = Result<T, LineSetError>;
