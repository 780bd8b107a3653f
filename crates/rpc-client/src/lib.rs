use blobfee_types::{Address, Bytes, ObservedBlock, RpcError, TxReceipt, B256, U256};

pub mod alloy;
pub mod tracker;

pub use alloy::AlloyRpc;
pub use tracker::ReceiptTracker;

/// The slice of the execution node's JSON-RPC surface the harness consumes.
///
/// Implementations must tolerate any number of concurrent calls. Balances and
/// nonces are always read at the latest block.
#[async_trait::async_trait]
pub trait NodeRpc: Send + Sync + 'static {
    async fn balance(&self, address: Address) -> Result<U256, RpcError>;

    async fn nonce(&self, address: Address) -> Result<u64, RpcError>;

    /// Submit an EIP-2718 encoded transaction, returning its hash
    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, RpcError>;

    /// `Ok(None)` while the transaction is not yet mined
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, RpcError>;

    /// Fetch a block with full transaction objects
    async fn block_by_hash(&self, block_hash: B256) -> Result<Option<ObservedBlock>, RpcError>;
}
