//! Data gas fee-market model.
//!
//! The excess data gas of a block is a running total of how far blob usage has
//! overshot the per-block target. It is computed from the parent header alone,
//! so a sequence of blocks can be checked by folding from a known anchor. The
//! price of a unit of data gas is an exponential of that excess.
use alloy_eips::eip4844::fake_exponential;
use blobfee_types::{
    BlobCounting, ExcessRule, FeeMarketError, FeeMarketParams, FeeMarketState, HarnessConfig,
    ObservedBlock, B256,
};
use itertools::Itertools as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A block whose header excess matched the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBlock {
    pub hash: B256,
    pub number: u64,
    pub blob_count: u64,
    pub excess_data_gas: u64,
    /// Price paid by the block's blob transactions
    pub data_gas_price: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeMarketModel {
    params: FeeMarketParams,
    rule: ExcessRule,
    counting: BlobCounting,
}

impl FeeMarketModel {
    pub fn new(params: FeeMarketParams, rule: ExcessRule, counting: BlobCounting) -> Self {
        Self {
            params,
            rule,
            counting,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(
            config.fee_market.params(),
            config.fee_market.rule,
            config.scenarios.blob_counting,
        )
    }

    pub fn params(&self) -> &FeeMarketParams {
        &self.params
    }

    pub fn rule(&self) -> ExcessRule {
        self.rule
    }

    pub fn counting(&self) -> BlobCounting {
        self.counting
    }

    /// `max(0, previous_excess + blob_count * data_gas_per_blob - target)`
    pub fn next_excess(&self, previous_excess: u64, blob_count: u64) -> u64 {
        previous_excess
            .saturating_add(blob_count.saturating_mul(self.params.data_gas_per_blob))
            .saturating_sub(self.params.target_data_gas_per_block)
    }

    pub fn data_gas_price(&self, excess: u64) -> u128 {
        fake_exponential(
            self.params.min_data_gas_price,
            u128::from(excess),
            self.params.update_fraction,
        )
    }

    pub fn data_gas_fee(&self, excess: u64, blob_count: u64) -> u128 {
        u128::from(blob_count)
            .saturating_mul(u128::from(self.params.data_gas_per_blob))
            .saturating_mul(self.data_gas_price(excess))
    }

    pub fn blob_count(&self, block: &ObservedBlock) -> u64 {
        block.blob_count(self.counting)
    }

    /// Excess the header of a child of `parent` must carry when the child
    /// includes `blob_count` blobs.
    pub fn child_excess(&self, parent: &FeeMarketState, blob_count: u64) -> u64 {
        match self.rule {
            ExcessRule::Draft => self.next_excess(parent.excess_data_gas, blob_count),
            ExcessRule::Cancun => self.next_excess(parent.excess_data_gas, parent.blob_count),
        }
    }

    /// Excess that prices the blob transactions of a block.
    pub fn pricing_excess(&self, parent_excess: u64, block_excess: u64) -> u64 {
        match self.rule {
            ExcessRule::Draft => parent_excess,
            ExcessRule::Cancun => block_excess,
        }
    }

    /// Expected excess for every block, folded in the given order.
    pub fn predict(&self, anchor: FeeMarketState, blocks: &[ObservedBlock]) -> Vec<u64> {
        blocks
            .iter()
            .scan(anchor, |state, block| {
                let blob_count = self.blob_count(block);
                let excess = self.child_excess(state, blob_count);
                *state = FeeMarketState {
                    block_hash: block.hash,
                    excess_data_gas: excess,
                    blob_count,
                };
                Some(excess)
            })
            .collect()
    }

    /// Checks that `blocks` descend one by one from `anchor` and that every
    /// header carries the excess the fold predicts. Stops at the first problem.
    pub fn verify(
        &self,
        anchor: FeeMarketState,
        blocks: &[ObservedBlock],
    ) -> Result<Vec<VerifiedBlock>, FeeMarketError> {
        let mut state = anchor;
        let mut verified = Vec::with_capacity(blocks.len());

        for block in blocks {
            if block.parent_hash != state.block_hash {
                return Err(FeeMarketError::ChainGap {
                    number: block.number,
                    expected_parent: state.block_hash,
                    actual_parent: block.parent_hash,
                });
            }
            let actual = block
                .excess_data_gas
                .ok_or(FeeMarketError::MissingExcess {
                    block_hash: block.hash,
                    number: block.number,
                })?;

            let blob_count = self.blob_count(block);
            let expected = self.child_excess(&state, blob_count);
            if expected != actual {
                return Err(FeeMarketError::Mismatch {
                    block_hash: block.hash,
                    number: block.number,
                    expected,
                    actual,
                });
            }

            let price = self.data_gas_price(self.pricing_excess(state.excess_data_gas, actual));
            debug!(
                block.number = block.number,
                block.blobs = blob_count,
                block.excess_data_gas = actual,
                data_gas_price = price,
                "verified excess data gas"
            );
            verified.push(VerifiedBlock {
                hash: block.hash,
                number: block.number,
                blob_count,
                excess_data_gas: actual,
                data_gas_price: price,
            });
            state = FeeMarketState {
                block_hash: block.hash,
                excess_data_gas: actual,
                blob_count,
            };
        }

        Ok(verified)
    }
}

/// Ascending block number. The fold assumes this order.
pub fn sort_by_number(blocks: &mut [ObservedBlock]) {
    blocks.sort_by_key(|block| block.number);
}

/// Keeps the first occurrence of every block hash.
pub fn dedup_by_hash(blocks: impl IntoIterator<Item = ObservedBlock>) -> Vec<ObservedBlock> {
    blocks.into_iter().unique_by(|block| block.hash).collect()
}
