//! Error types for shapekey operations

use thiserror::Error;

/// Structural validation failures.
///
/// Every variant names the offending field path so callers can point at the
/// exact component of a Statement or Mutation that must be fixed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing at {path}")]
    RequiredFieldMissing { path: String },

    #[error("Field must be non-empty at {path}")]
    EmptyField { path: String },

    #[error("Invalid value at {path}: {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("Invalid operator {op:?} at {path}: operators outside the fixed set must match custom:*")]
    InvalidOperator { path: String, op: String },

    #[error("Conflicting fields at {path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("Field not allowed for this action at {path}: {reason}")]
    Forbidden { path: String, reason: String },

    #[error("Malformed shape id at {path}: expected s_ followed by 64 lowercase hex characters")]
    MalformedShapeId { path: String },
}

impl ValidationError {
    /// Field path of the offending component.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { path }
            | ValidationError::EmptyField { path }
            | ValidationError::InvalidValue { path, .. }
            | ValidationError::InvalidOperator { path, .. }
            | ValidationError::Conflict { path, .. }
            | ValidationError::Forbidden { path, .. }
            | ValidationError::MalformedShapeId { path } => path,
        }
    }
}

/// Dependency store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Dependency store lock poisoned")]
    LockPoisoned,
}

/// Failure to lower a value into its JSON form before canonicalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Value for {subject} could not be encoded as JSON: {reason}")]
    NotRepresentable { subject: String, reason: String },

    #[error("Expected a JSON object for {subject}")]
    NotAnObject { subject: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate entry for {field}: {value}")]
    Duplicate { field: String, value: String },
}

/// Master error type for all shapekey errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for shapekey operations.
pub type ShapeResult<T> = Result<T, ShapeError>;

// =============================================================================
// TESTS
// =============================================================================
