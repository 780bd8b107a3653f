use crate::committer::BlobCommitter;
use alloy_consensus::{SignableTransaction as _, TxEip4844, TxEip4844WithSidecar};
use blobfee_types::{
    Address, Blob, BlobTransaction, BlobTxConfig, BuildError, FeeMarketParams, U256,
};
use blobfee_vault::Vault;
use std::sync::Arc;
use tracing::debug;

/// Builds signed blob transactions. Nothing is submitted here.
#[derive(Clone)]
pub struct BlobTxBuilder {
    vault: Arc<dyn Vault>,
    committer: Arc<dyn BlobCommitter>,
    config: BlobTxConfig,
    /// Lowest data gas fee cap the protocol accepts
    min_data_gas_price: u128,
}

impl std::fmt::Debug for BlobTxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobTxBuilder")
            .field("config", &self.config)
            .field("min_data_gas_price", &self.min_data_gas_price)
            .finish_non_exhaustive()
    }
}

impl BlobTxBuilder {
    pub fn new(
        vault: Arc<dyn Vault>,
        committer: Arc<dyn BlobCommitter>,
        config: BlobTxConfig,
        params: &FeeMarketParams,
    ) -> Self {
        Self {
            vault,
            committer,
            config,
            min_data_gas_price: params.min_data_gas_price,
        }
    }

    pub fn config(&self) -> &BlobTxConfig {
        &self.config
    }

    pub fn build(
        &self,
        nonce: u64,
        value: U256,
        sender: Address,
        recipient: Address,
        blobs: Vec<Blob>,
    ) -> Result<BlobTransaction, BuildError> {
        if blobs.is_empty() {
            return Err(BuildError::NoBlobs);
        }
        if self.config.max_fee_per_data_gas < self.min_data_gas_price {
            return Err(BuildError::FeeCapBelowFloor {
                cap: self.config.max_fee_per_data_gas,
                floor: self.min_data_gas_price,
            });
        }

        let bundle = self.committer.commit(blobs)?;
        let tx = TxEip4844 {
            chain_id: self.config.chain_id,
            nonce,
            gas_limit: self.config.gas_limit,
            max_fee_per_gas: self.config.max_fee_per_gas,
            max_priority_fee_per_gas: self.config.max_priority_fee_per_gas,
            to: recipient,
            value,
            blob_versioned_hashes: bundle.versioned_hashes,
            max_fee_per_blob_gas: self.config.max_fee_per_data_gas,
            ..Default::default()
        };
        let mut tx = TxEip4844WithSidecar::from_tx_and_sidecar(tx, bundle.sidecar);
        let signature = self.vault.sign_transaction(sender, &mut tx)?;
        let tx = BlobTransaction::new(tx.into_signed(signature))?;

        debug!(
            tx.hash = %tx.hash(),
            tx.nonce = nonce,
            tx.blobs = tx.blob_count(),
            %sender,
            "built blob transaction"
        );
        Ok(tx)
    }
}

/// Hands out consecutive nonces. Assign all nonces before spawning submission
/// tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceCounter {
    next: u64,
}

impl NonceCounter {
    pub fn new(start: u64) -> Self {
        Self { next: start }
    }

    pub fn assign(&mut self) -> u64 {
        let nonce = self.next;
        self.next += 1;
        nonce
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// `count` all-zero blobs.
pub fn zero_blobs(count: usize) -> Vec<Blob> {
    vec![Blob::ZERO; count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::committer::BlobBundle;
    use alloy_consensus::SignableTransaction;
    use alloy_eips::eip4844::{BlobTransactionSidecar, Bytes48};
    use alloy_primitives::{Signature, B256};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Commitments are placeholders; counts how often it was asked.
    #[derive(Default)]
    struct CountingCommitter {
        calls: AtomicUsize,
    }

    impl BlobCommitter for CountingCommitter {
        fn commit(&self, blobs: Vec<Blob>) -> Result<BlobBundle, BuildError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = blobs.len();
            Ok(BlobBundle {
                versioned_hashes: (0..n).map(|i| B256::with_last_byte(i as u8 + 1)).collect(),
                sidecar: BlobTransactionSidecar {
                    blobs,
                    commitments: vec![Bytes48::ZERO; n],
                    proofs: vec![Bytes48::ZERO; n],
                },
            })
        }
    }

    struct FixedSigner {
        address: Address,
    }

    #[async_trait::async_trait]
    impl Vault for FixedSigner {
        async fn create_account(
            &self,
            _funding: Option<U256>,
        ) -> Result<Address, blobfee_types::HarnessError> {
            Ok(self.address)
        }

        fn sign_transaction(
            &self,
            address: Address,
            _tx: &mut dyn SignableTransaction<Signature>,
        ) -> Result<Signature, BuildError> {
            if address != self.address {
                return Err(BuildError::Signing {
                    address,
                    reason: "unknown".to_owned(),
                });
            }
            Ok(Signature::new(U256::from(1), U256::from(2), false))
        }
    }

    fn builder(config: BlobTxConfig) -> (BlobTxBuilder, Arc<CountingCommitter>) {
        let committer = Arc::new(CountingCommitter::default());
        let vault = Arc::new(FixedSigner {
            address: Address::repeat_byte(0xaa),
        });
        let builder = BlobTxBuilder::new(
            vault,
            committer.clone(),
            config,
            &FeeMarketParams::draft(),
        );
        (builder, committer)
    }

    #[test]
    fn fields_come_from_the_config() {
        let config = BlobTxConfig {
            chain_id: 99,
            ..Default::default()
        };
        let (builder, _) = builder(config);
        let tx = builder
            .build(
                3,
                U256::from(1234),
                Address::repeat_byte(0xaa),
                Address::repeat_byte(0xbb),
                zero_blobs(2),
            )
            .unwrap();

        assert_eq!(tx.chain_id(), 99);
        assert_eq!(tx.nonce(), 3);
        assert_eq!(tx.gas_limit(), 210_000);
        assert_eq!(tx.max_fee_per_data_gas(), 3_000_000_000);
        assert_eq!(tx.to(), Address::repeat_byte(0xbb));
        assert_eq!(tx.blob_count(), 2);
    }

    #[test]
    fn empty_blob_list_is_rejected_before_committing() {
        let (builder, committer) = builder(BlobTxConfig::default());
        let err = builder
            .build(
                0,
                U256::ZERO,
                Address::repeat_byte(0xaa),
                Address::ZERO,
                vec![],
            )
            .unwrap_err();

        assert!(matches!(err, BuildError::NoBlobs));
        assert_eq!(committer.calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case::fee_cap_below_floor(
        BlobTxConfig { max_fee_per_data_gas: 0, ..Default::default() },
        Address::repeat_byte(0xaa),
        |err: &BuildError| matches!(err, BuildError::FeeCapBelowFloor { cap: 0, floor: 1 }),
    )]
    #[case::unknown_sender_cannot_sign(
        BlobTxConfig::default(),
        Address::repeat_byte(0xcc),
        |err: &BuildError| matches!(
            err,
            BuildError::Signing { address, .. } if *address == Address::repeat_byte(0xcc)
        ),
    )]
    fn build_is_refused(
        #[case] config: BlobTxConfig,
        #[case] sender: Address,
        #[case] expected: fn(&BuildError) -> bool,
    ) {
        let (builder, _) = builder(config);
        let err = builder
            .build(0, U256::ZERO, sender, Address::ZERO, zero_blobs(1))
            .unwrap_err();

        assert!(expected(&err), "unexpected error: {err}");
    }

    #[test]
    fn nonces_are_consecutive() {
        let mut nonces = NonceCounter::new(5);
        let assigned = (0..4).map(|_| nonces.assign()).collect::<Vec<_>>();
        assert_eq!(assigned, vec![5, 6, 7, 8]);
        assert_eq!(nonces.peek(), 9);
    }
}
