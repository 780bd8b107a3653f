//! Key custody for scenario accounts.
//!
//! Scenarios never see private keys. They ask the vault for fresh accounts and
//! hand it transactions to sign.
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::Encodable2718 as _;
use alloy_network::TxSignerSync as _;
use alloy_primitives::{Signature, TxKind};
use alloy_signer_local::PrivateKeySigner;
use blobfee_rpc_client::{NodeRpc, ReceiptTracker};
use blobfee_types::{
    Address, BlobTxConfig, BuildError, HarnessError, InvariantViolation, U256,
};
use eyre::WrapErr as _;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Gas used by a plain value transfer.
pub const TRANSFER_GAS: u64 = 21_000;

#[async_trait::async_trait]
pub trait Vault: Send + Sync + 'static {
    /// Create a new account. With `funding` the account is funded and the
    /// funding transfer is confirmed before this returns.
    async fn create_account(&self, funding: Option<U256>) -> Result<Address, HarnessError>;

    fn sign_transaction(
        &self,
        address: Address,
        tx: &mut dyn SignableTransaction<Signature>,
    ) -> Result<Signature, BuildError>;
}

/// Holds keys in memory and funds accounts from a pre-funded faucet key.
pub struct LocalVault {
    rpc: Arc<dyn NodeRpc>,
    tracker: ReceiptTracker,
    tx_config: BlobTxConfig,
    faucet: PrivateKeySigner,
    /// Next faucet nonce, read from the node on first use
    faucet_nonce: Mutex<Option<u64>>,
    accounts: RwLock<HashMap<Address, PrivateKeySigner>>,
}

impl std::fmt::Debug for LocalVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVault")
            .field("faucet", &self.faucet.address())
            .finish_non_exhaustive()
    }
}

impl LocalVault {
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        tracker: ReceiptTracker,
        tx_config: BlobTxConfig,
        faucet_key: &str,
    ) -> eyre::Result<Self> {
        let faucet = faucet_key
            .trim()
            .parse::<PrivateKeySigner>()
            .wrap_err("invalid faucet key")?;
        Ok(Self {
            rpc,
            tracker,
            tx_config,
            faucet,
            faucet_nonce: Mutex::new(None),
            accounts: RwLock::new(HashMap::new()),
        })
    }

    pub fn faucet(&self) -> Address {
        self.faucet.address()
    }

    fn signer(&self, address: Address) -> Result<PrivateKeySigner, BuildError> {
        let accounts = self.accounts.read().map_err(|_| BuildError::Signing {
            address,
            reason: "key store lock poisoned".to_owned(),
        })?;
        accounts
            .get(&address)
            .cloned()
            .ok_or_else(|| BuildError::Signing {
                address,
                reason: "no key held for this address".to_owned(),
            })
    }

    fn insert(&self, signer: PrivateKeySigner) -> Result<Address, BuildError> {
        let address = signer.address();
        self.accounts
            .write()
            .map_err(|_| BuildError::Signing {
                address,
                reason: "key store lock poisoned".to_owned(),
            })?
            .insert(address, signer);
        Ok(address)
    }

    /// Transfers `amount` from the faucet and waits for the transfer to land.
    async fn fund(&self, to: Address, amount: U256) -> Result<(), HarnessError> {
        let tx_hash = {
            let mut next_nonce = self.faucet_nonce.lock().await;
            let nonce = match *next_nonce {
                Some(nonce) => nonce,
                None => self.rpc.nonce(self.faucet.address()).await?,
            };

            let mut tx = TxEip1559 {
                chain_id: self.tx_config.chain_id,
                nonce,
                gas_limit: TRANSFER_GAS,
                max_fee_per_gas: self.tx_config.max_fee_per_gas,
                max_priority_fee_per_gas: self.tx_config.max_priority_fee_per_gas,
                to: TxKind::Call(to),
                value: amount,
                ..Default::default()
            };
            let signature =
                self.faucet
                    .sign_transaction_sync(&mut tx)
                    .map_err(|e| BuildError::Signing {
                        address: self.faucet.address(),
                        reason: e.to_string(),
                    })?;
            let encoded = TxEnvelope::Eip1559(tx.into_signed(signature)).encoded_2718();
            let tx_hash = self.rpc.send_raw_transaction(encoded.into()).await?;
            *next_nonce = Some(nonce + 1);
            debug!(tx.hash = %tx_hash, faucet.nonce = nonce, %to, %amount, "funding transfer sent");
            tx_hash
        };

        let receipt = self.tracker.await_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(InvariantViolation::new(
                "funding transfer status",
                true,
                false,
                format!("tx {tx_hash} in block {}", receipt.block_hash),
            )
            .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Vault for LocalVault {
    async fn create_account(&self, funding: Option<U256>) -> Result<Address, HarnessError> {
        let address = self.insert(PrivateKeySigner::random())?;
        match funding {
            Some(amount) if !amount.is_zero() => {
                self.fund(address, amount).await?;
                info!(account = %address, %amount, "created funded account");
            }
            _ => info!(account = %address, "created account"),
        }
        Ok(address)
    }

    fn sign_transaction(
        &self,
        address: Address,
        tx: &mut dyn SignableTransaction<Signature>,
    ) -> Result<Signature, BuildError> {
        self.signer(address)?
            .sign_transaction_sync(tx)
            .map_err(|e| BuildError::Signing {
                address,
                reason: e.to_string(),
            })
    }
}
