//! Error types and error codes for rbay
//!
//! This module defines:
//! - `RbayError`: the error enum shared by every rbay crate
//! - `ErrorCode`: structured error codes for machine-readable output

use serde::Serialize;

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RbayError {
    #[error("could not acquire lock on '{resource}' after {attempts} attempts")]
    LockAcquisitionTimeout { resource: String, attempts: u32 },

    #[error("lease on '{0}' has expired, refusing further store operations")]
    LeaseExpired(String),

    #[error("item '{0}' does not exist")]
    ItemNotFound(String),

    #[error("bid of {amount} is too low, current price is {price}")]
    BidTooLow { amount: f64, price: f64 },

    #[error("item '{0}' is closed to bidding")]
    AuctionClosed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("procedure '{0}' is not registered")]
    ProcedureNotFound(String),

    #[error("caused: {0}")]
    InvalidArgument(String),

    #[error("invalid stored data: {0}")]
    InvalidData(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RbayError>;

impl RbayError {
    /// Whether the caller may retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RbayError::LockAcquisitionTimeout { .. } | RbayError::StoreUnavailable(_)
        )
    }

    pub fn error_code(&self) -> ErrorCode<'static> {
        match self {
            RbayError::LockAcquisitionTimeout { .. } => LOCK_ACQUISITION_TIMEOUT,
            RbayError::LeaseExpired(_) => LEASE_EXPIRED,
            RbayError::ItemNotFound(_) => ITEM_NOT_FOUND,
            RbayError::BidTooLow { .. } => BID_TOO_LOW,
            RbayError::AuctionClosed(_) => AUCTION_CLOSED,
            RbayError::StoreUnavailable(_) => STORE_UNAVAILABLE,
            RbayError::ProcedureNotFound(_) => PROCEDURE_NOT_FOUND,
            RbayError::InvalidArgument(_) => PARAMETER_VALIDATE_ERROR,
            RbayError::InvalidData(_) => DATA_ACCESS_ERROR,
            RbayError::Config(_) => CONFIG_ERROR,
        }
    }
}

/// Error code structure for command output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

pub const DATA_ACCESS_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "data access error",
};

pub const PARAMETER_VALIDATE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "parameter validate error",
};

pub const CONFIG_ERROR: ErrorCode<'static> = ErrorCode {
    code: 20003,
    message: "configuration error",
};

// Lock errors
pub const LOCK_ACQUISITION_TIMEOUT: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "lock acquisition timeout",
};

pub const LEASE_EXPIRED: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "lease expired",
};

// Auction errors
pub const ITEM_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 40001,
    message: "item not found",
};

pub const BID_TOO_LOW: ErrorCode<'static> = ErrorCode {
    code: 40002,
    message: "bid too low",
};

pub const AUCTION_CLOSED: ErrorCode<'static> = ErrorCode {
    code: 40003,
    message: "auction closed",
};

// Store errors
pub const STORE_UNAVAILABLE: ErrorCode<'static> = ErrorCode {
    code: 50001,
    message: "store unavailable",
};

pub const PROCEDURE_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 50002,
    message: "procedure not found",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        let timeout = RbayError::LockAcquisitionTimeout {
            resource: "item-1".to_string(),
            attempts: 20,
        };
        assert!(timeout.is_retryable());
        assert!(RbayError::StoreUnavailable("connection refused".to_string()).is_retryable());

        assert!(!RbayError::LeaseExpired("item-1".to_string()).is_retryable());
        assert!(
            !RbayError::BidTooLow {
                amount: 10.0,
                price: 15.0
            }
            .is_retryable()
        );
        assert!(!RbayError::ProcedureNotFound("unlock".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RbayError::BidTooLow {
            amount: 15.0,
            price: 15.0,
        };
        assert_eq!(err.to_string(), "bid of 15 is too low, current price is 15");

        let err = RbayError::LockAcquisitionTimeout {
            resource: "abc".to_string(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "could not acquire lock on 'abc' after 3 attempts"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            RbayError::LeaseExpired(String::new()),
            RbayError::ItemNotFound(String::new()),
            RbayError::AuctionClosed(String::new()),
            RbayError::StoreUnavailable(String::new()),
            RbayError::ProcedureNotFound(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.error_code().code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
