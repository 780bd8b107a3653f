//! Conformance scenarios for an execution node's blob transaction support.
//!
//! A [`TestEnv`] bundles the node connection, the key vault, the transaction
//! builder and the fee-market model. Each [`Scenario`] drives real
//! transactions through the node and checks the observable results exactly.
pub mod env;
pub mod report;
pub mod scenarios;

pub use env::TestEnv;
pub use report::{
    FeeMarketReport, InclusionReport, OperationLog, OutcomeSummary, ScenarioOutcome,
    ScenarioReport,
};
pub use scenarios::{blob_transaction_test, fee_market_test};

use serde::Serialize;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Scenario {
    /// One blob transaction, checked for exact fee accounting
    BlobTransaction,
    /// Many concurrent blob transactions, checked against the fee-market fold
    FeeMarket,
}

impl Scenario {
    pub fn all() -> Vec<Self> {
        use strum::IntoEnumIterator as _;
        Self::iter().collect()
    }
}
