use thiserror::Error;

/// Error taxonomy for the bracket core. Callers are expected to branch on the
/// variant: `Validation` means the input was bad, `InvalidState` means the
/// operation is not allowed right now, `NotFound` means the referenced record
/// does not exist, and `Consistency` means the bracket graph itself is broken
/// and the operation was aborted rather than guessed at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bracket inconsistency: {0}")]
    Consistency(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        CoreError::InvalidState(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        CoreError::Consistency(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        CoreError::Unauthorized(message.into())
    }
}
