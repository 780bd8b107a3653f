use alloy_primitives::{Address, B256};
use std::fmt::Display;
use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures while constructing a blob transaction. None of these are retried.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("a blob transaction needs at least one blob")]
    NoBlobs,

    #[error("failed to compute blob commitments: {0}")]
    Commitment(String),

    #[error("max_fee_per_data_gas {cap} is below the minimum data gas price {floor}")]
    FeeCapBelowFloor { cap: u128, floor: u128 },

    #[error("failed to sign for {address}: {reason}")]
    Signing { address: Address, reason: String },

    #[error("not a signed blob transaction with sidecar: {0}")]
    InvalidEnvelope(String),
}

/// A transport level failure. A receipt that simply does not exist yet is not an
/// `RpcError`; the client reports it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
#[error("rpc {operation} failed: {source}")]
pub struct RpcError {
    pub operation: &'static str,
    #[source]
    pub source: BoxError,
}

impl RpcError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// An observed value that differs from the value the protocol demands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{check} failed: expected {expected}, actual {actual} ({context})")]
pub struct InvariantViolation {
    pub check: &'static str,
    pub expected: String,
    pub actual: String,
    /// Names the transaction and/or block the check ran against
    pub context: String,
}

impl InvariantViolation {
    pub fn new(
        check: &'static str,
        expected: impl Display,
        actual: impl Display,
        context: impl Display,
    ) -> Self {
        Self {
            check,
            expected: expected.to_string(),
            actual: actual.to_string(),
            context: context.to_string(),
        }
    }
}

/// Fails with an [`InvariantViolation`] unless `expected == actual`.
pub fn ensure_eq<T: PartialEq + Display>(
    check: &'static str,
    expected: T,
    actual: T,
    context: impl Display,
) -> Result<(), InvariantViolation> {
    if expected == actual {
        Ok(())
    } else {
        Err(InvariantViolation::new(check, expected, actual, context))
    }
}

/// The first problem found while folding the fee market over observed blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeMarketError {
    #[error("block {number} ({block_hash}) has no excess data gas field")]
    MissingExcess { block_hash: B256, number: u64 },

    #[error("block {number} has parent {actual_parent}, expected {expected_parent}")]
    ChainGap {
        number: u64,
        expected_parent: B256,
        actual_parent: B256,
    },

    #[error("block {number} ({block_hash}) excess data gas: expected {expected}, actual {actual}")]
    Mismatch {
        block_hash: B256,
        number: u64,
        expected: u64,
        actual: u64,
    },
}

/// Terminal outcome of a failed scenario.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Construction(#[from] BuildError),

    #[error(transparent)]
    Transport(#[from] RpcError),

    #[error("no receipt for {tx_hash} after {waited:?} ({polls} polls)")]
    Timeout {
        tx_hash: B256,
        waited: Duration,
        polls: u32,
    },

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    FeeMarket(#[from] FeeMarketError),

    #[error("scenario task failed: {0}")]
    TaskFailed(String),
}

impl HarnessError {
    /// Short machine friendly name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Construction(_) => "construction",
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Invariant(_) => "invariant",
            Self::FeeMarket(_) => "fee_market",
            Self::TaskFailed(_) => "task_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ensure_eq_reports_both_sides() {
        assert!(ensure_eq("nonce", 1_u64, 1, "tx 0x01").is_ok());

        let violation = ensure_eq("nonce", 1_u64, 2, "tx 0x01").unwrap_err();
        assert_eq!(violation.expected, "1");
        assert_eq!(violation.actual, "2");
        assert_eq!(
            violation.to_string(),
            "nonce failed: expected 1, actual 2 (tx 0x01)"
        );
    }

    #[test]
    fn conversions_keep_the_class() {
        let err: HarnessError = RpcError::new("eth_getBalance", "connection refused").into();
        assert_eq!(err.kind(), "transport");
        assert_eq!(err.to_string(), "rpc eth_getBalance failed: connection refused");

        let err: HarnessError = FeeMarketError::MissingExcess {
            block_hash: B256::ZERO,
            number: 3,
        }
        .into();
        assert!(matches!(
            err,
            HarnessError::FeeMarket(FeeMarketError::MissingExcess { number: 3, .. })
        ));
    }
}
