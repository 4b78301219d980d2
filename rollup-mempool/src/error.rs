//! Error types for transaction admission

use thiserror::Error;

/// Result type for mempool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Admission errors
///
/// Every variant is surfaced synchronously to the submitter. Only
/// [`Error::LockTimeout`] and [`Error::StorageFailure`] are transient.
#[derive(Error, Debug)]
pub enum Error {
    /// Parse or static-field failure on the submitted transaction
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A stored or delta snapshot failed to parse
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Transaction nonce does not match the account's expected nonce
    #[error("Invalid nonce for account {account_index}: expected {expected}, got {got}")]
    StaleOrInvalidNonce {
        /// Submitting account
        account_index: i64,
        /// Nonce the overlay expects next
        expected: i64,
        /// Nonce carried by the transaction
        got: i64,
    },

    /// A touched balance would go below zero
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    /// Signature verification failed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// No durable snapshot for the requested id
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Offer bit already set in the signer's bitmap
    #[error("Offer {offer_id} of account {account_index} already canceled or finalized")]
    OfferAlreadyConsumed {
        /// Offer owner
        account_index: i64,
        /// Offer id
        offer_id: i64,
    },

    /// AMM math produced less than the declared minimum, or a state invariant broke
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Resource lock not acquired within the bounded wait
    #[error("Lock timeout on {0}")]
    LockTimeout(String),

    /// Durable store failure (RocksDB, IO)
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Binary serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether resubmitting the same transaction unmodified may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LockTimeout(_) | Error::StorageFailure(_))
    }

    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedInput(_) => "malformed_input",
            Error::MalformedSnapshot(_) => "malformed_snapshot",
            Error::StaleOrInvalidNonce { .. } => "stale_or_invalid_nonce",
            Error::InsufficientBalance(_) => "insufficient_balance",
            Error::InvalidSignature(_) => "invalid_signature",
            Error::ResourceNotFound(_) => "resource_not_found",
            Error::OfferAlreadyConsumed { .. } => "offer_already_consumed",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::LockTimeout(_) => "lock_timeout",
            Error::StorageFailure(_) | Error::Io(_) => "storage_failure",
            Error::Serialization(_) | Error::Json(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Config(_) => "config",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StorageFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(Error::LockTimeout("pool:1".into()).is_retryable());
        assert!(Error::StorageFailure("disk".into()).is_retryable());
        assert!(!Error::InvalidSignature("bad".into()).is_retryable());
        assert!(!Error::StaleOrInvalidNonce {
            account_index: 1,
            expected: 2,
            got: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::OfferAlreadyConsumed {
            account_index: 7,
            offer_id: 130,
        };
        assert_eq!(
            err.to_string(),
            "Offer 130 of account 7 already canceled or finalized"
        );
        assert_eq!(err.kind(), "offer_already_consumed");
    }
}
