use crate::error::BuildError;
use alloy_consensus::{Signed, TxEip4844, TxEip4844Variant, TxEip4844WithSidecar, TxEnvelope};
use alloy_eips::{eip2718::Encodable2718 as _, eip4844::BlobTransactionSidecar};
use alloy_primitives::{Address, Bytes, Signature, B256, U256};

/// A signed EIP-4844 transaction that still carries its sidecar.
///
/// Instances are immutable. Resubmitting means building a new one with a new
/// nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobTransaction {
    signed: Signed<TxEip4844WithSidecar>,
}

impl BlobTransaction {
    pub fn new(signed: Signed<TxEip4844WithSidecar>) -> Result<Self, BuildError> {
        let inner = signed.tx();
        let blobs = inner.sidecar.blobs.len();
        if blobs == 0 {
            return Err(BuildError::NoBlobs);
        }
        let hashes = inner.tx.blob_versioned_hashes.len();
        if hashes != blobs {
            return Err(BuildError::InvalidEnvelope(format!(
                "{hashes} versioned hashes for {blobs} blobs"
            )));
        }
        if inner.sidecar.commitments.len() != blobs {
            return Err(BuildError::InvalidEnvelope(format!(
                "{} commitments for {blobs} blobs",
                inner.sidecar.commitments.len()
            )));
        }
        Ok(Self { signed })
    }

    pub fn hash(&self) -> B256 {
        *self.signed.hash()
    }

    pub fn signature(&self) -> &Signature {
        self.signed.signature()
    }

    fn tx(&self) -> &TxEip4844 {
        &self.signed.tx().tx
    }

    pub fn chain_id(&self) -> u64 {
        self.tx().chain_id
    }

    pub fn nonce(&self) -> u64 {
        self.tx().nonce
    }

    pub fn gas_limit(&self) -> u64 {
        self.tx().gas_limit
    }

    pub fn max_fee_per_gas(&self) -> u128 {
        self.tx().max_fee_per_gas
    }

    pub fn max_priority_fee_per_gas(&self) -> u128 {
        self.tx().max_priority_fee_per_gas
    }

    pub fn max_fee_per_data_gas(&self) -> u128 {
        self.tx().max_fee_per_blob_gas
    }

    pub fn value(&self) -> U256 {
        self.tx().value
    }

    pub fn to(&self) -> Address {
        self.tx().to
    }

    pub fn blob_versioned_hashes(&self) -> &[B256] {
        &self.tx().blob_versioned_hashes
    }

    pub fn blob_count(&self) -> u64 {
        self.blob_versioned_hashes().len() as u64
    }

    pub fn sidecar(&self) -> &BlobTransactionSidecar {
        &self.signed.tx().sidecar
    }

    pub fn envelope(&self) -> TxEnvelope {
        let (tx, signature, hash) = self.signed.clone().into_parts();
        TxEnvelope::Eip4844(Signed::new_unchecked(
            TxEip4844Variant::TxEip4844WithSidecar(tx),
            signature,
            hash,
        ))
    }

    /// Network encoding, sidecar included. This is what `eth_sendRawTransaction`
    /// expects for a blob transaction.
    pub fn encoded_2718(&self) -> Bytes {
        self.envelope().encoded_2718().into()
    }
}

impl TryFrom<TxEnvelope> for BlobTransaction {
    type Error = BuildError;

    fn try_from(envelope: TxEnvelope) -> Result<Self, Self::Error> {
        let signed = match envelope {
            TxEnvelope::Eip4844(signed) => signed,
            other => {
                return Err(BuildError::InvalidEnvelope(format!(
                    "transaction type {:?}",
                    other.tx_type()
                )))
            }
        };
        let (tx, signature, hash) = signed.into_parts();
        match tx {
            TxEip4844Variant::TxEip4844WithSidecar(tx) => {
                Self::new(Signed::new_unchecked(tx, signature, hash))
            }
            TxEip4844Variant::TxEip4844(_) => Err(BuildError::InvalidEnvelope(
                "blob transaction without sidecar".to_owned(),
            )),
        }
    }
}
