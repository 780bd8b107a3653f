use crate::NodeRpc;
use blobfee_types::{HarnessError, TrackerConfig, TxReceipt, B256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Waits for transactions to be mined by polling for their receipts.
///
/// Cheap to clone; all clones share the same RPC handle and can wait on
/// different transactions concurrently.
#[derive(Clone)]
pub struct ReceiptTracker {
    rpc: Arc<dyn NodeRpc>,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for ReceiptTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptTracker")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReceiptTracker {
    pub fn new(rpc: Arc<dyn NodeRpc>, config: &TrackerConfig) -> Self {
        Self {
            rpc,
            poll_interval: config.poll_interval(),
            timeout: config.receipt_timeout(),
        }
    }

    /// Polls until the receipt exists. A transport failure ends the wait at
    /// once; running past the timeout (including inside a slow RPC call) is a
    /// [`HarnessError::Timeout`].
    #[tracing::instrument(level = "trace", skip_all, fields(tx.hash = %tx_hash))]
    pub async fn await_receipt(&self, tx_hash: B256) -> Result<TxReceipt, HarnessError> {
        let mut polls = 0_u32;
        let poll_loop = async {
            loop {
                polls += 1;
                if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
                    info!(
                        tx.hash = %tx_hash,
                        block.number = receipt.block_number,
                        attempts = polls,
                        "transaction mined"
                    );
                    return Ok::<_, HarnessError>(receipt);
                }
                debug!(tx.hash = %tx_hash, attempt = polls, "receipt not found yet");
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let outcome = tokio::time::timeout(self.timeout, poll_loop).await;
        outcome.unwrap_or(Err(HarnessError::Timeout {
            tx_hash,
            waited: self.timeout,
            polls,
        }))
    }
}
