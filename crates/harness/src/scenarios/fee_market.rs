use super::fetch_block;
use crate::{FeeMarketReport, TestEnv};
use blobfee_fee_market::sort_by_number;
use blobfee_rpc_client::{NodeRpc, ReceiptTracker};
use blobfee_tx_builder::{zero_blobs, NonceCounter};
use blobfee_types::{
    ensure_eq, Bytes, FeeMarketError, FeeMarketState, GapPolicy, HarnessError,
    InvariantViolation, ObservedBlock, TxReceipt, B256, U256,
};
use futures::future::try_join_all;
use itertools::Itertools as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Pushes `induction_tx_count` single-blob transactions through the node at
/// once, then folds the fee-market rules over every block that carried one and
/// compares each header's excess data gas with the fold.
pub async fn fee_market_test(env: &TestEnv) -> Result<FeeMarketReport, HarnessError> {
    let count = env.config.scenarios.induction_tx_count;

    env.record("create funded sender");
    let sender = env
        .vault
        .create_account(Some(U256::from(env.config.scenarios.sender_funding)))
        .await?;
    env.record("create recipient");
    let recipient = env.vault.create_account(None).await?;

    let mut nonces = NonceCounter::new(env.rpc.nonce(sender).await?);
    let txs = (0..count)
        .map(|_| {
            env.builder
                .build(nonces.assign(), U256::ZERO, sender, recipient, zero_blobs(1))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let tx_hashes = txs.iter().map(|tx| tx.hash()).collect::<Vec<_>>();
    info!(%sender, transactions = count, "induction transactions built");

    env.record(format!("submit {count} blob transactions concurrently"));
    let (results_tx, mut results_rx) = mpsc::channel(count.max(1));
    let mut tasks = JoinSet::new();
    for tx in &txs {
        let rpc = Arc::clone(&env.rpc);
        let tracker = env.tracker.clone();
        let results = results_tx.clone();
        let (tx_hash, encoded) = (tx.hash(), tx.encoded_2718());
        tasks.spawn(async move {
            let result = submit_and_confirm(rpc.as_ref(), &tracker, tx_hash, encoded).await;
            // the receiver is gone once the scenario has failed
            results.send(result).await.ok();
        });
    }
    drop(results_tx);

    // dropping `tasks` on an early return aborts whatever is still in flight
    let mut receipts = Vec::with_capacity(count);
    while receipts.len() < count {
        match results_rx.recv().await {
            Some(result) => receipts.push(result?),
            None => return Err(task_failure(&mut tasks).await),
        }
    }
    debug!(receipts = receipts.len(), "all induction receipts collected");

    let mut blocks = try_join_all(
        receipts
            .iter()
            .unique_by(|receipt| receipt.block_hash)
            .map(|receipt| {
                env.record(format!("fetch block {}", receipt.block_hash));
                fetch_block(env, receipt.block_hash, format!("tx {}", receipt.tx_hash))
            }),
    )
    .await?;

    for block in &blocks {
        if block.excess_data_gas.is_none() {
            return Err(FeeMarketError::MissingExcess {
                block_hash: block.hash,
                number: block.number,
            }
            .into());
        }
    }
    for receipt in &receipts {
        let listed = blocks
            .iter()
            .find(|block| block.hash == receipt.block_hash)
            .and_then(|block| block.transaction(&receipt.tx_hash));
        if listed.is_none() {
            return Err(InvariantViolation::new(
                "block lists transaction",
                receipt.tx_hash,
                "absent",
                format!("block {} ({})", receipt.block_number, receipt.block_hash),
            )
            .into());
        }
    }

    sort_by_number(&mut blocks);
    let first_parent = blocks
        .first()
        .map(|block| block.parent_hash)
        .ok_or_else(|| InvariantViolation::new("observed blocks", "at least one", 0, "induction"))?;
    let parent = fetch_block(env, first_parent, "parent of the first observed block").await?;
    let anchor = FeeMarketState::anchored_at(&parent, env.model.counting());

    let (chain, bridged) = match env.config.scenarios.gap_policy {
        GapPolicy::Reject => (blocks, Vec::new()),
        GapPolicy::Bridge => bridge_gaps(env, &parent, blocks).await?,
    };

    env.record(format!("verify excess data gas over {} blocks", chain.len()));
    let verified = env.model.verify(anchor, &chain)?;

    for receipt in &receipts {
        let (Some(reported), Some(block)) = (
            receipt.data_gas_price,
            verified.iter().find(|block| block.hash == receipt.block_hash),
        ) else {
            continue;
        };
        ensure_eq(
            "receipt data gas price",
            block.data_gas_price,
            reported,
            format!("tx {} in block {}", receipt.tx_hash, block.number),
        )?;
    }

    info!(
        blocks = verified.len(),
        bridged = bridged.len(),
        rule = %env.model.rule(),
        "fee market verified"
    );
    Ok(FeeMarketReport {
        tx_hashes,
        anchor,
        blocks: verified,
        bridged,
    })
}

async fn submit_and_confirm(
    rpc: &dyn NodeRpc,
    tracker: &ReceiptTracker,
    tx_hash: B256,
    encoded: Bytes,
) -> Result<TxReceipt, HarnessError> {
    let submitted = rpc.send_raw_transaction(encoded).await?;
    ensure_eq("node transaction hash", tx_hash, submitted, "eth_sendRawTransaction")?;
    let receipt = tracker.await_receipt(tx_hash).await?;
    ensure_eq(
        "receipt status",
        true,
        receipt.success,
        format!("tx {tx_hash} in block {}", receipt.block_hash),
    )?;
    Ok(receipt)
}

/// The result channel closed before every transaction reported: find out why.
async fn task_failure(tasks: &mut JoinSet<()>) -> HarnessError {
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            return HarnessError::TaskFailed(err.to_string());
        }
    }
    HarnessError::TaskFailed("result channel closed before every transaction reported".into())
}

/// Fills the holes between consecutive observed blocks by walking parent
/// hashes back to the previous observed block. Returns the contiguous chain and
/// the numbers of the blocks that had to be fetched.
async fn bridge_gaps(
    env: &TestEnv,
    anchor: &ObservedBlock,
    observed: Vec<ObservedBlock>,
) -> Result<(Vec<ObservedBlock>, Vec<u64>), HarnessError> {
    let mut chain = Vec::with_capacity(observed.len());
    let mut bridged = Vec::new();
    let (mut prev_hash, mut prev_number) = (anchor.hash, anchor.number);

    for block in observed {
        let mut missing = Vec::new();
        let (mut cursor, mut child_number) = (block.parent_hash, block.number);
        while cursor != prev_hash {
            let filler = fetch_block(env, cursor, format!("parent of block {child_number}")).await?;
            // must stay strictly between the previous observed block and its child
            if filler.number <= prev_number || filler.number >= child_number {
                return Err(FeeMarketError::ChainGap {
                    number: child_number,
                    expected_parent: prev_hash,
                    actual_parent: cursor,
                }
                .into());
            }
            warn!(
                block.number = filler.number,
                block.hash = %filler.hash,
                "bridging block without induction transactions"
            );
            env.record(format!("bridge block {}", filler.number));
            cursor = filler.parent_hash;
            child_number = filler.number;
            missing.push(filler);
        }
        missing.reverse();
        bridged.extend(missing.iter().map(|filler| filler.number));
        chain.extend(missing);
        (prev_hash, prev_number) = (block.hash, block.number);
        chain.push(block);
    }

    Ok((chain, bridged))
}
