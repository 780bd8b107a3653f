use crate::Scenario;
use blobfee_fee_market::VerifiedBlock;
use blobfee_types::{Address, FeeMarketState, HarnessError, B256, U256};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Evidence collected by a passing single-transaction inclusion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InclusionReport {
    pub tx_hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub sender: Address,
    pub recipient: Address,
    pub value: U256,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub pricing_excess: u64,
    pub data_gas_price: u128,
    pub data_gas_fee: u128,
    pub balance_before: U256,
    pub balance_after: U256,
}

/// Every block the fee-market fold checked, in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeMarketReport {
    pub tx_hashes: Vec<B256>,
    pub anchor: FeeMarketState,
    pub blocks: Vec<VerifiedBlock>,
    /// Blocks fetched only to close gaps between observed blocks
    pub bridged: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioReport {
    Inclusion(InclusionReport),
    FeeMarket(FeeMarketReport),
}

/// Shared, append-only record of the operations a run attempted.
#[derive(Debug, Clone, Default)]
pub struct OperationLog(Arc<Mutex<Vec<String>>>);

impl OperationLog {
    pub fn record(&self, operation: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub result: Result<ScenarioReport, HarnessError>,
    pub operations: Vec<String>,
    pub elapsed: Duration,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }

    pub fn summary(&self) -> OutcomeSummary<'_> {
        let (report, error) = match &self.result {
            Ok(report) => (Some(report), None),
            Err(err) => (None, Some(err.to_string())),
        };
        OutcomeSummary {
            scenario: self.scenario,
            passed: self.passed(),
            elapsed_ms: self.elapsed.as_millis(),
            error_kind: self.result.as_ref().err().map(HarnessError::kind),
            error,
            report,
            operations: &self.operations,
        }
    }
}

/// Serializable view of a [`ScenarioOutcome`].
#[derive(Debug, Serialize)]
pub struct OutcomeSummary<'a> {
    pub scenario: Scenario,
    pub passed: bool,
    pub elapsed_ms: u128,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub report: Option<&'a ScenarioReport>,
    pub operations: &'a [String],
}
