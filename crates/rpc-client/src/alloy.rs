use crate::NodeRpc;
use alloy_consensus::Transaction as _;
use alloy_network::{ReceiptResponse as _, TransactionResponse as _};
use alloy_provider::{Provider as _, RootProvider};
use alloy_rpc_types_eth::{Block, TransactionReceipt};
use blobfee_types::{Address, Bytes, ObservedBlock, ObservedTx, RpcError, TxReceipt, B256, U256};
use url::Url;

/// [`NodeRpc`] over an alloy HTTP provider.
#[derive(Clone, Debug)]
pub struct AlloyRpc {
    provider: RootProvider,
}

impl AlloyRpc {
    pub fn new(url: Url) -> Self {
        Self {
            provider: RootProvider::new_http(url),
        }
    }

    pub fn connect(url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(url).map_err(|e| RpcError::new("parse_url", e))?;
        Ok(Self::new(url))
    }
}

#[async_trait::async_trait]
impl NodeRpc for AlloyRpc {
    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| RpcError::new("eth_getBalance", e))
    }

    async fn nonce(&self, address: Address) -> Result<u64, RpcError> {
        self.provider
            .get_transaction_count(address)
            .await
            .map_err(|e| RpcError::new("eth_getTransactionCount", e))
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, RpcError> {
        let pending = self
            .provider
            .send_raw_transaction(&encoded)
            .await
            .map_err(|e| RpcError::new("eth_sendRawTransaction", e))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, RpcError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RpcError::new("eth_getTransactionReceipt", e))?;
        Ok(receipt.as_ref().and_then(observed_receipt))
    }

    async fn block_by_hash(&self, block_hash: B256) -> Result<Option<ObservedBlock>, RpcError> {
        let block = self
            .provider
            .get_block_by_hash(block_hash)
            .full()
            .await
            .map_err(|e| RpcError::new("eth_getBlockByHash", e))?;
        block.as_ref().map(observed_block).transpose()
    }
}

/// A receipt without a block hash belongs to a pending transaction and is
/// treated as not found.
fn observed_receipt(receipt: &TransactionReceipt) -> Option<TxReceipt> {
    Some(TxReceipt {
        tx_hash: receipt.transaction_hash,
        block_hash: receipt.block_hash?,
        block_number: receipt.block_number?,
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        data_gas_used: receipt.blob_gas_used,
        data_gas_price: receipt.blob_gas_price,
        success: receipt.status(),
    })
}

fn observed_block(block: &Block) -> Result<ObservedBlock, RpcError> {
    let transactions = block.transactions.as_transactions().ok_or_else(|| {
        RpcError::new(
            "eth_getBlockByHash",
            format!("block {} returned without full transactions", block.header.hash),
        )
    })?;

    Ok(ObservedBlock {
        hash: block.header.hash,
        number: block.header.number,
        parent_hash: block.header.parent_hash,
        excess_data_gas: block.header.excess_blob_gas,
        data_gas_used: block.header.blob_gas_used,
        transactions: transactions
            .iter()
            .map(|tx| ObservedTx {
                hash: tx.tx_hash(),
                blob_versioned_hashes: tx
                    .blob_versioned_hashes()
                    .map(<[B256]>::to_vec)
                    .unwrap_or_default(),
            })
            .collect(),
    })
}
