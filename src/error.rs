//! Error taxonomy for slip creation and settlement.
//!
//! Validation and balance errors surface to the caller. Resolution and
//! ambiguity errors are absorbed by settlement: the affected leg stays pending.

use rust_decimal::Decimal;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or self-contradictory slip
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("insufficient balance: balance {balance}, required {required}")]
    InsufficientBalance { balance: Decimal, required: Decimal },

    /// Storage transaction failure; nothing from the failed operation is visible
    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),

    #[error("result resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// Only the swapped home/away fixture exists in the source
    #[error("ambiguous result for {home} vs {away} ({competition}): fixture found with home/away reversed")]
    AmbiguousResult {
        home: String,
        away: String,
        competition: String,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Persistence(err.into())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Persistence(err)
    }
}

/// Failure to read a result source. Recoverable: retried on the next cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no source")]
    NoSource,

    #[error("source unreadable: {0}")]
    Io(String),

    #[error("source malformed: {0}")]
    Malformed(String),

    #[error("lookup timed out after {0}ms")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_messages() {
        let err = EngineError::InsufficientBalance {
            balance: dec!(5.00),
            required: dec!(10),
        };
        assert_eq!(
            err.to_string(),
            "insufficient balance: balance 5.00, required 10"
        );

        let err: EngineError = ResolutionError::NoSource.into();
        assert_eq!(err.to_string(), "result resolution failed: no source");
    }

    #[test]
    fn test_sqlite_errors_become_persistence() {
        let err: EngineError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, EngineError::Persistence(_)));
    }
}
