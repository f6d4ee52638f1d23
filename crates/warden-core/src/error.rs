use thiserror::Error;

/// Core error types for model validation and conversion.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid condition expression: {message}")]
    InvalidCondition { message: String },

    #[error("Unknown condition operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid date window: effective {effective} is after expiry {expiry}")]
    InvalidDateWindow { effective: String, expiry: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time parsing error: {0}")]
    TimeError(#[from] time::error::Parse),
}

impl CoreError {
    /// Create a new InvalidPattern error
    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        Self::InvalidPattern(pattern.into())
    }

    /// Create a new InvalidCondition error
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            message: message.into(),
        }
    }

    /// Create a new UnknownOperator error
    pub fn unknown_operator(op: impl Into<String>) -> Self {
        Self::UnknownOperator(op.into())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
