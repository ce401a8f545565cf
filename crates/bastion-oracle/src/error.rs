use bastion_core::CoreError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Snapshot captured at {captured_at} precedes active snapshot captured at {active}")]
    OutOfOrder {
        captured_at: chrono::DateTime<chrono::Utc>,
        active: chrono::DateTime<chrono::Utc>,
    },

    #[error("Snapshot ingestion exceeded {timeout_ms}ms deadline")]
    Timeout { timeout_ms: u64 },

    #[error("Snapshot source failed: {0}")]
    Source(String),

    #[error("Snapshot observer failed: {0}")]
    Observer(String),

    #[error("Market context unavailable (snapshot age: {age_secs:?}s)")]
    ContextUnavailable { age_secs: Option<i64> },

    #[error("Confidence {confidence} not above degraded floor {floor}")]
    ContextInsufficient { confidence: Decimal, floor: Decimal },
}

impl From<CoreError> for OracleError {
    fn from(e: CoreError) -> Self {
        Self::InvalidSnapshot(e.to_string())
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
