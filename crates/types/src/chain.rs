use crate::config::BlobCounting;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Receipt of a mined transaction. Absent until mined and never revised after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub data_gas_used: Option<u64>,
    pub data_gas_price: Option<u128>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedTx {
    pub hash: B256,
    pub blob_versioned_hashes: Vec<B256>,
}

/// A block header and its transaction list as read back from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedBlock {
    pub hash: B256,
    pub number: u64,
    pub parent_hash: B256,
    pub excess_data_gas: Option<u64>,
    pub data_gas_used: Option<u64>,
    pub transactions: Vec<ObservedTx>,
}

impl ObservedBlock {
    pub fn blob_count(&self, counting: BlobCounting) -> u64 {
        match counting {
            BlobCounting::PerTransaction => self.transactions.len() as u64,
            BlobCounting::VersionedHashes => self
                .transactions
                .iter()
                .map(|tx| tx.blob_versioned_hashes.len() as u64)
                .sum(),
        }
    }

    pub fn transaction(&self, hash: &B256) -> Option<&ObservedTx> {
        self.transactions.iter().find(|tx| &tx.hash == hash)
    }
}

/// Starting point of a fee-market fold: the block every folded block descends
/// from, its excess data gas and its blob count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMarketState {
    pub block_hash: B256,
    pub excess_data_gas: u64,
    pub blob_count: u64,
}

impl FeeMarketState {
    /// Anchors on `block`, treating a missing excess field as zero.
    pub fn anchored_at(block: &ObservedBlock, counting: BlobCounting) -> Self {
        Self {
            block_hash: block.hash,
            excess_data_gas: block.excess_data_gas.unwrap_or_default(),
            blob_count: block.blob_count(counting),
        }
    }
}
