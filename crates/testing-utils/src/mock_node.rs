//! In-memory execution node speaking the [`NodeRpc`] surface.
//!
//! Transactions are decoded, signature-recovered and executed against a flat
//! account map. Blocks follow the configured fee-market model, so a correct
//! harness verifies them cleanly unless a fault is injected.
use alloy_consensus::{transaction::SignerRecoverable as _, Transaction as _, TxEnvelope};
use alloy_eips::eip2718::Decodable2718 as _;
use alloy_primitives::{address, keccak256};
use blobfee_fee_market::FeeMarketModel;
use blobfee_rpc_client::NodeRpc;
use blobfee_types::{
    Address, BlobTransaction, Bytes, FeeMarketState, HarnessConfig, ObservedBlock, ObservedTx,
    RpcError, TxReceipt, B256, ETHER, U256,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Well-known development key, pre-funded on every mock node.
pub const DEV_FAUCET_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_FAUCET: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

const INTRINSIC_GAS: u64 = 21_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mining {
    /// A receipt query for a pending transaction mines a block first
    OnReceiptQuery,
    /// Only [`MockNode::mine_block`] or a spawned miner produce blocks
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct MockNodeConfig {
    pub chain_id: u64,
    pub base_fee: u64,
    pub max_blobs_per_block: u64,
    pub mining: Mining,
    /// Excess data gas of the genesis header
    pub genesis_excess: u64,
    pub faucet_balance: U256,
}

impl MockNodeConfig {
    pub fn for_harness(config: &HarnessConfig) -> Self {
        Self {
            chain_id: config.tx.chain_id,
            base_fee: 7,
            max_blobs_per_block: 4,
            mining: Mining::OnReceiptQuery,
            genesis_excess: 0,
            faucet_balance: U256::from(10_000_u128 * ETHER),
        }
    }
}

#[derive(Debug, Default)]
struct Account {
    balance: U256,
    nonce: u64,
}

#[derive(Debug)]
struct PendingTx {
    hash: B256,
    sender: Address,
    envelope: TxEnvelope,
    blob_hashes: Vec<B256>,
}

#[derive(Debug)]
struct MinedBlock {
    /// What `block_by_hash` serves, faults applied
    served: ObservedBlock,
    excess_data_gas: u64,
    blob_count: u64,
}

#[derive(Debug, Default)]
struct Faults {
    corrupt_excess: HashMap<u64, u64>,
    omit_excess: HashSet<u64>,
    failing_receipt_queries: usize,
    dropped_blob_submissions: usize,
    empty_block_after_each: bool,
    blob_overcharge: U256,
    failing_blob_executions: usize,
    misreported_data_gas_price: Option<u128>,
}

#[derive(Debug)]
struct NodeState {
    accounts: HashMap<Address, Account>,
    pending: Vec<PendingTx>,
    known: HashSet<B256>,
    blocks: Vec<MinedBlock>,
    by_hash: HashMap<B256, usize>,
    receipts: HashMap<B256, TxReceipt>,
    faults: Faults,
}

impl NodeState {
    fn head(&self) -> &MinedBlock {
        // genesis is pushed on construction
        &self.blocks[self.blocks.len() - 1]
    }

    /// Pending and reachable from the sender's current nonce through other
    /// pending transactions.
    fn is_executable(&self, tx_hash: &B256) -> bool {
        let Some(tx) = self.pending.iter().find(|tx| &tx.hash == tx_hash) else {
            return false;
        };
        let mut next = self.accounts.get(&tx.sender).map_or(0, |a| a.nonce);
        while next < tx.envelope.nonce() {
            let queued = self
                .pending
                .iter()
                .any(|p| p.sender == tx.sender && p.envelope.nonce() == next);
            if !queued {
                return false;
            }
            next += 1;
        }
        next == tx.envelope.nonce()
    }
}

#[derive(Debug)]
pub struct MockNode {
    config: MockNodeConfig,
    model: FeeMarketModel,
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn new(config: MockNodeConfig, model: FeeMarketModel) -> Arc<Self> {
        let genesis = ObservedBlock {
            hash: keccak256(b"blobfee mock genesis"),
            number: 0,
            parent_hash: B256::ZERO,
            excess_data_gas: Some(config.genesis_excess),
            data_gas_used: Some(0),
            transactions: vec![],
        };
        let mut accounts = HashMap::new();
        accounts.insert(
            DEV_FAUCET,
            Account {
                balance: config.faucet_balance,
                nonce: 0,
            },
        );
        let state = NodeState {
            accounts,
            pending: vec![],
            known: HashSet::new(),
            by_hash: HashMap::from([(genesis.hash, 0)]),
            blocks: vec![MinedBlock {
                served: genesis,
                excess_data_gas: config.genesis_excess,
                blob_count: 0,
            }],
            receipts: HashMap::new(),
            faults: Faults::default(),
        };
        Arc::new(Self {
            config,
            model,
            state: Mutex::new(state),
        })
    }

    /// Node following the harness' fee market, mining on receipt queries.
    pub fn for_harness(config: &HarnessConfig) -> Arc<Self> {
        Self::new(
            MockNodeConfig::for_harness(config),
            FeeMarketModel::from_config(config),
        )
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().expect("mock node state poisoned")
    }

    pub fn config(&self) -> &MockNodeConfig {
        &self.config
    }

    pub fn head(&self) -> ObservedBlock {
        self.state().head().served.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Serve `excess` instead of the real excess for block `number`.
    pub fn corrupt_excess_at(&self, number: u64, excess: u64) {
        self.state().faults.corrupt_excess.insert(number, excess);
    }

    /// Serve block `number` without the excess field.
    pub fn omit_excess_at(&self, number: u64) {
        self.state().faults.omit_excess.insert(number);
    }

    /// The next `count` receipt queries fail with a transport error.
    pub fn fail_receipt_queries(&self, count: usize) {
        self.state().faults.failing_receipt_queries = count;
    }

    /// The next `count` blob transactions are acknowledged but never mined.
    pub fn drop_blob_submissions(&self, count: usize) {
        self.state().faults.dropped_blob_submissions = count;
    }

    /// Mine an empty block right after every block that includes transactions.
    pub fn insert_empty_blocks(&self, enabled: bool) {
        self.state().faults.empty_block_after_each = enabled;
    }

    /// Charge every blob transaction sender `extra` wei on top of the real cost.
    pub fn overcharge_blob_senders(&self, extra: U256) {
        self.state().faults.blob_overcharge = extra;
    }

    /// The next `count` blob transactions are mined but revert. Fees are still
    /// charged and the value stays with the sender.
    pub fn fail_blob_executions(&self, count: usize) {
        self.state().faults.failing_blob_executions = count;
    }

    /// Blob transaction receipts report `price` instead of the block's price.
    pub fn misreport_data_gas_price(&self, price: u128) {
        self.state().faults.misreported_data_gas_price = Some(price);
    }

    /// Mine one block from the pending pool. Empty when nothing is executable.
    pub fn mine_block(&self) -> ObservedBlock {
        let mut state = self.state();
        self.mine(&mut state)
    }

    /// Mine blocks on a fixed cadence while transactions are pending.
    pub fn spawn_miner(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                {
                    let mut state = node.state();
                    if !state.pending.is_empty() {
                        node.mine(&mut state);
                    }
                }
            }
        })
    }

    fn mine(&self, state: &mut NodeState) -> ObservedBlock {
        let block = self.mine_one(state);
        if state.faults.empty_block_after_each && !block.transactions.is_empty() {
            self.mine_one(state);
        }
        block
    }

    fn mine_one(&self, state: &mut NodeState) -> ObservedBlock {
        let parent = state.head();
        let parent_hash = parent.served.hash;
        let number = parent.served.number + 1;
        let parent_state = FeeMarketState {
            block_hash: parent_hash,
            excess_data_gas: parent.excess_data_gas,
            blob_count: parent.blob_count,
        };
        // the pricing excess never depends on the block's own blob count
        let pricing_excess = self.model.pricing_excess(
            parent_state.excess_data_gas,
            self.model.child_excess(&parent_state, 0),
        );
        let data_gas_price = self.model.data_gas_price(pricing_excess);
        let per_blob = self.model.params().data_gas_per_blob;

        let mut included = Vec::new();
        let mut blob_count = 0_u64;
        let mut next_nonces = HashMap::<Address, u64>::new();
        while let Some(index) = state.pending.iter().position(|tx| {
            let next_nonce = next_nonces.get(&tx.sender).copied().unwrap_or_else(|| {
                state.accounts.get(&tx.sender).map_or(0, |a| a.nonce)
            });
            let blobs = tx.blob_hashes.len() as u64;
            tx.envelope.nonce() == next_nonce
                && blob_count + blobs <= self.config.max_blobs_per_block
                && tx
                    .envelope
                    .max_fee_per_blob_gas()
                    .is_none_or(|cap| cap >= data_gas_price)
        }) {
            let tx = state.pending.remove(index);
            blob_count += tx.blob_hashes.len() as u64;
            next_nonces.insert(tx.sender, tx.envelope.nonce() + 1);
            included.push(tx);
        }

        let excess = self.model.child_excess(&parent_state, blob_count);
        let mut preimage = Vec::with_capacity(40 + 32 * included.len());
        preimage.extend_from_slice(&number.to_be_bytes());
        preimage.extend_from_slice(parent_hash.as_slice());
        for tx in &included {
            preimage.extend_from_slice(tx.hash.as_slice());
        }
        let hash = keccak256(&preimage);

        let mut transactions = Vec::with_capacity(included.len());
        for tx in included {
            let effective_gas_price = tx.envelope.effective_gas_price(Some(self.config.base_fee));
            let blobs = tx.blob_hashes.len() as u64;
            let data_gas_used = blobs * per_blob;
            let is_blob_tx = matches!(tx.envelope, TxEnvelope::Eip4844(_));
            let reverted = is_blob_tx && state.faults.failing_blob_executions > 0;
            if reverted {
                state.faults.failing_blob_executions -= 1;
            }
            let transferred = if reverted { U256::ZERO } else { tx.envelope.value() };
            let mut cost = transferred
                + U256::from(INTRINSIC_GAS) * U256::from(effective_gas_price)
                + U256::from(data_gas_used) * U256::from(data_gas_price);
            if is_blob_tx {
                cost += state.faults.blob_overcharge;
            }

            let sender = state.accounts.entry(tx.sender).or_default();
            sender.balance = sender.balance.saturating_sub(cost);
            sender.nonce += 1;
            if let Some(to) = tx.envelope.to() {
                state.accounts.entry(to).or_default().balance += transferred;
            }

            let reported_price = state
                .faults
                .misreported_data_gas_price
                .unwrap_or(data_gas_price);
            state.receipts.insert(
                tx.hash,
                TxReceipt {
                    tx_hash: tx.hash,
                    block_hash: hash,
                    block_number: number,
                    gas_used: INTRINSIC_GAS,
                    effective_gas_price,
                    data_gas_used: is_blob_tx.then_some(data_gas_used),
                    data_gas_price: is_blob_tx.then_some(reported_price),
                    success: !reverted,
                },
            );
            transactions.push(ObservedTx {
                hash: tx.hash,
                blob_versioned_hashes: tx.blob_hashes,
            });
        }

        let served_excess = if state.faults.omit_excess.contains(&number) {
            None
        } else {
            Some(
                state
                    .faults
                    .corrupt_excess
                    .get(&number)
                    .copied()
                    .unwrap_or(excess),
            )
        };
        let served = ObservedBlock {
            hash,
            number,
            parent_hash,
            excess_data_gas: served_excess,
            data_gas_used: Some(blob_count * per_blob),
            transactions,
        };
        debug!(
            block.number = number,
            block.txs = served.transactions.len(),
            block.blobs = blob_count,
            block.excess_data_gas = excess,
            "mock node mined block"
        );

        state.by_hash.insert(hash, state.blocks.len());
        state.blocks.push(MinedBlock {
            served: served.clone(),
            excess_data_gas: excess,
            blob_count,
        });
        served
    }
}

fn rejected(reason: impl Into<String>) -> RpcError {
    RpcError::new("eth_sendRawTransaction", reason.into())
}

#[async_trait::async_trait]
impl NodeRpc for MockNode {
    async fn balance(&self, address: Address) -> Result<U256, RpcError> {
        Ok(self
            .state()
            .accounts
            .get(&address)
            .map_or(U256::ZERO, |a| a.balance))
    }

    async fn nonce(&self, address: Address) -> Result<u64, RpcError> {
        Ok(self.state().accounts.get(&address).map_or(0, |a| a.nonce))
    }

    async fn send_raw_transaction(&self, encoded: Bytes) -> Result<B256, RpcError> {
        let envelope = TxEnvelope::decode_2718(&mut encoded.as_ref())
            .map_err(|e| RpcError::new("eth_sendRawTransaction", e))?;
        let sender = envelope
            .recover_signer()
            .map_err(|e| RpcError::new("eth_sendRawTransaction", e))?;
        if envelope.chain_id() != Some(self.config.chain_id) {
            return Err(rejected(format!(
                "invalid chain id {:?}",
                envelope.chain_id()
            )));
        }

        let blob_hashes = if matches!(envelope, TxEnvelope::Eip4844(_)) {
            let blob_tx = BlobTransaction::try_from(envelope.clone())
                .map_err(|e| RpcError::new("eth_sendRawTransaction", e))?;
            let derived = blob_tx.sidecar().versioned_hashes().collect::<Vec<_>>();
            if derived != blob_tx.blob_versioned_hashes() {
                return Err(rejected("versioned hashes do not match commitments"));
            }
            if blob_tx.blob_count() > self.config.max_blobs_per_block {
                return Err(rejected("too many blobs"));
            }
            derived
        } else {
            vec![]
        };

        let hash = *envelope.tx_hash();
        let mut state = self.state();
        if !state.known.insert(hash) {
            return Err(rejected("already known"));
        }
        let account = state.accounts.get(&sender);
        let (balance, nonce) = account.map_or((U256::ZERO, 0), |a| (a.balance, a.nonce));
        if envelope.nonce() < nonce {
            state.known.remove(&hash);
            return Err(rejected(format!(
                "nonce too low: next nonce {nonce}, tx nonce {}",
                envelope.nonce()
            )));
        }
        let max_data_gas = U256::from(blob_hashes.len() as u64 * self.model.params().data_gas_per_blob);
        let upfront = envelope.value()
            + U256::from(envelope.gas_limit()) * U256::from(envelope.max_fee_per_gas())
            + max_data_gas * U256::from(envelope.max_fee_per_blob_gas().unwrap_or_default());
        if balance < upfront {
            state.known.remove(&hash);
            return Err(rejected(format!(
                "insufficient funds: balance {balance}, cost {upfront}"
            )));
        }

        if !blob_hashes.is_empty() && state.faults.dropped_blob_submissions > 0 {
            state.faults.dropped_blob_submissions -= 1;
            warn!(tx.hash = %hash, "mock node dropping transaction");
            return Ok(hash);
        }
        state.pending.push(PendingTx {
            hash,
            sender,
            envelope,
            blob_hashes,
        });
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, RpcError> {
        let mut state = self.state();
        if state.faults.failing_receipt_queries > 0 {
            state.faults.failing_receipt_queries -= 1;
            return Err(RpcError::new(
                "eth_getTransactionReceipt",
                "injected transport failure",
            ));
        }
        if let Some(receipt) = state.receipts.get(&tx_hash) {
            return Ok(Some(receipt.clone()));
        }
        if self.config.mining == Mining::OnReceiptQuery && state.is_executable(&tx_hash) {
            self.mine(&mut state);
            return Ok(state.receipts.get(&tx_hash).cloned());
        }
        Ok(None)
    }

    async fn block_by_hash(&self, block_hash: B256) -> Result<Option<ObservedBlock>, RpcError> {
        let state = self.state();
        Ok(state
            .by_hash
            .get(&block_hash)
            .map(|&index| state.blocks[index].served.clone()))
    }
}
