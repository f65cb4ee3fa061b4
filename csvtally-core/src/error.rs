use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupt tracking record for {import_id}: {reason}")]
    Corrupt { import_id: String, reason: String },
}

impl TrackerError {
    /// Infrastructure faults the caller's batch job should retry.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "redis")]
            TrackerError::Redis(_) => true,
            TrackerError::Unavailable(_) => true,
            _ => false,
        }
    }

    pub(crate) fn corrupt(
        import_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TrackerError::Corrupt {
            import_id: import_id.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
