use crate::ETHER;
use alloy_eips::{eip4844, eip7691};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// # Harness Configuration
///
/// Everything a scenario needs to know about the node under test and the
/// transactions it sends. Every section except `rpc_url` has defaults, so a
/// minimal file only names the endpoint and the faucet key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// JSON-RPC endpoint of the node under test
    pub rpc_url: String,

    /// Hex private key of a pre-funded account the vault draws test funds from
    #[serde(default)]
    pub faucet_key: Option<String>,

    /// Fee and gas fields stamped onto every blob transaction
    #[serde(default)]
    pub tx: BlobTxConfig,

    /// Which recurrence and constants the node is expected to follow
    #[serde(default)]
    pub fee_market: FeeMarketConfig,

    /// Receipt polling cadence and bound
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub scenarios: ScenarioConfig,
}

impl HarnessConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            faucet_key: None,
            tx: BlobTxConfig::default(),
            fee_market: FeeMarketConfig::default(),
            tracker: TrackerConfig::default(),
            scenarios: ScenarioConfig::default(),
        }
    }

    /// Config used by the in-memory node in tests: short polls, the well-known
    /// development faucet key and the default fee market.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn testing() -> Self {
        let mut config = Self::new("http://127.0.0.1:8545");
        config.faucet_key =
            Some("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_owned());
        config.tracker = TrackerConfig {
            poll_interval_ms: 10,
            receipt_timeout_ms: 5_000,
        };
        config
    }

    pub fn validate(&self) -> eyre::Result<()> {
        let floor = self.fee_market.params().min_data_gas_price;
        eyre::ensure!(
            self.tx.max_fee_per_data_gas >= floor,
            "tx.max_fee_per_data_gas ({}) must be at least the minimum data gas price ({})",
            self.tx.max_fee_per_data_gas,
            floor
        );
        eyre::ensure!(
            self.tx.max_priority_fee_per_gas <= self.tx.max_fee_per_gas,
            "tx.max_priority_fee_per_gas ({}) exceeds tx.max_fee_per_gas ({})",
            self.tx.max_priority_fee_per_gas,
            self.tx.max_fee_per_gas
        );
        eyre::ensure!(
            self.scenarios.induction_tx_count > 0,
            "scenarios.induction_tx_count must be non-zero"
        );
        eyre::ensure!(
            self.fee_market.params().update_fraction > 0,
            "fee_market.update_fraction must be non-zero"
        );
        eyre::ensure!(
            self.tracker.poll_interval_ms > 0,
            "tracker.poll_interval_ms must be non-zero"
        );
        eyre::ensure!(
            self.tracker.receipt_timeout_ms > 0,
            "tracker.receipt_timeout_ms must be non-zero"
        );
        Ok(())
    }
}

/// Gas and fee fields for every blob transaction the builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlobTxConfig {
    pub chain_id: u64,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    /// Cap on the price per unit of data gas. Needs to be at least the minimum
    /// data gas price or the node rejects the transaction outright.
    pub max_fee_per_data_gas: u128,
}

impl Default for BlobTxConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            gas_limit: 210_000,
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            max_fee_per_data_gas: 3_000_000_000,
        }
    }
}

/// Selects which block's blob usage feeds a header's excess data gas.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExcessRule {
    /// `excess(block) = next(excess(parent), blobs(block))`; the block's
    /// transactions are priced from the parent's excess.
    #[default]
    Draft,
    /// `excess(block) = next(excess(parent), blobs(parent))`; the block's
    /// transactions are priced from the block's own excess.
    Cancun,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeeMarketPreset {
    #[default]
    Draft,
    Cancun,
    Prague,
}

/// Constants of the data gas pricing recurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMarketParams {
    pub data_gas_per_blob: u64,
    pub target_data_gas_per_block: u64,
    pub min_data_gas_price: u128,
    pub update_fraction: u128,
}

impl FeeMarketParams {
    /// Values used while excess data gas was still accounted per including block.
    pub const fn draft() -> Self {
        Self {
            data_gas_per_blob: 1 << 17,
            target_data_gas_per_block: 1 << 18,
            min_data_gas_price: 1,
            update_fraction: 2_225_652,
        }
    }

    pub const fn cancun() -> Self {
        Self {
            data_gas_per_blob: eip4844::DATA_GAS_PER_BLOB,
            target_data_gas_per_block: eip4844::TARGET_DATA_GAS_PER_BLOCK_DENCUN,
            min_data_gas_price: eip4844::BLOB_TX_MIN_BLOB_GASPRICE,
            update_fraction: eip4844::BLOB_GASPRICE_UPDATE_FRACTION,
        }
    }

    /// EIP-7691 raises the target to six blobs and slows the price response.
    pub const fn prague() -> Self {
        Self {
            data_gas_per_blob: eip4844::DATA_GAS_PER_BLOB,
            target_data_gas_per_block: eip7691::TARGET_BLOBS_PER_BLOCK_ELECTRA
                * eip4844::DATA_GAS_PER_BLOB,
            min_data_gas_price: eip4844::BLOB_TX_MIN_BLOB_GASPRICE,
            update_fraction: eip7691::BLOB_GASPRICE_UPDATE_FRACTION_PECTRA,
        }
    }
}

impl From<FeeMarketPreset> for FeeMarketParams {
    fn from(preset: FeeMarketPreset) -> Self {
        match preset {
            FeeMarketPreset::Draft => Self::draft(),
            FeeMarketPreset::Cancun => Self::cancun(),
            FeeMarketPreset::Prague => Self::prague(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeeMarketConfig {
    pub rule: ExcessRule,
    pub preset: FeeMarketPreset,
    /// Per-field overrides applied on top of the preset
    pub target_data_gas_per_block: Option<u64>,
    pub min_data_gas_price: Option<u128>,
    pub update_fraction: Option<u128>,
}

impl FeeMarketConfig {
    pub fn new(rule: ExcessRule, preset: FeeMarketPreset) -> Self {
        Self {
            rule,
            preset,
            ..Default::default()
        }
    }

    pub fn params(&self) -> FeeMarketParams {
        let mut params = FeeMarketParams::from(self.preset);
        if let Some(target) = self.target_data_gas_per_block {
            params.target_data_gas_per_block = target;
        }
        if let Some(min_price) = self.min_data_gas_price {
            params.min_data_gas_price = min_price;
        }
        if let Some(fraction) = self.update_fraction {
            params.update_fraction = fraction;
        }
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
    /// Upper bound on a single receipt wait; expiry fails the scenario
    pub receipt_timeout_ms: u64,
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            receipt_timeout_ms: 120_000,
        }
    }
}

/// How the number of blobs in a block is derived from its transactions.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BlobCounting {
    /// Every transaction counts as exactly one blob. Only valid when all
    /// transactions in the observed blocks are single-blob.
    PerTransaction,
    /// Sum of each transaction's versioned hashes.
    #[default]
    VersionedHashes,
}

/// What to do when two consecutive observed blocks are not parent and child.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GapPolicy {
    /// Fail the fold with a chain gap error.
    #[default]
    Reject,
    /// Fetch the missing ancestors and fold through them.
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Wei the vault funds each scenario sender with
    pub sender_funding: u128,
    /// Wei transferred by the single inclusion scenario
    pub inclusion_value: u128,
    /// Number of blob transactions the induction scenario submits concurrently
    pub induction_tx_count: usize,
    pub blob_counting: BlobCounting,
    pub gap_policy: GapPolicy,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            sender_funding: ETHER,
            inclusion_value: 1234,
            induction_tx_count: 20,
            blob_counting: BlobCounting::default(),
            gap_policy: GapPolicy::default(),
        }
    }
}
