use thiserror::Error;

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict on {resource} {id}: {reason}")]
    Conflict {
        resource: &'static str,
        id: String,
        reason: String,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LoyaltyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LoyaltyError::Validation(msg.into())
    }

    pub fn conflict(resource: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        LoyaltyError::Conflict {
            resource,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        LoyaltyError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        LoyaltyError::State(msg.into())
    }

    /// Store errors (timeouts, transient connection loss) may be retried by
    /// the caller; everything else is a hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoyaltyError::Store(_))
    }
}
