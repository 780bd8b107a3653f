mod blob_inclusion;
mod fee_market;

pub use blob_inclusion::blob_transaction_test;
pub use fee_market::fee_market_test;

use crate::TestEnv;
use blobfee_types::{HarnessError, InvariantViolation, ObservedBlock, B256};

/// Fetches a block that must exist.
async fn fetch_block(
    env: &TestEnv,
    block_hash: B256,
    context: impl std::fmt::Display,
) -> Result<ObservedBlock, HarnessError> {
    env.rpc.block_by_hash(block_hash).await?.ok_or_else(|| {
        InvariantViolation::new("block exists", block_hash, "not found", context).into()
    })
}
