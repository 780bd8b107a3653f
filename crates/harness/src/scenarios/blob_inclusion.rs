use super::fetch_block;
use crate::{InclusionReport, TestEnv};
use blobfee_tx_builder::zero_blobs;
use blobfee_types::{ensure_eq, HarnessError, InvariantViolation, U256};
use tracing::info;

/// Sends one single-blob transaction between a funded account and a fresh one
/// and checks balances, nonce and fee accounting to the wei.
///
/// `Funded -> Submitted -> Confirmed -> Verified`; any failed check ends the run.
pub async fn blob_transaction_test(env: &TestEnv) -> Result<InclusionReport, HarnessError> {
    let funding = U256::from(env.config.scenarios.sender_funding);
    let value = U256::from(env.config.scenarios.inclusion_value);

    env.record("create funded sender");
    let sender = env.vault.create_account(Some(funding)).await?;
    env.record("create recipient");
    let recipient = env.vault.create_account(None).await?;

    let balance_before = env.rpc.balance(sender).await?;
    ensure_eq(
        "sender funded balance",
        funding,
        balance_before,
        format!("account {sender}"),
    )?;
    let nonce_before = env.rpc.nonce(sender).await?;
    ensure_eq("sender initial nonce", 0, nonce_before, format!("account {sender}"))?;

    // Funded -> Submitted
    let tx = env
        .builder
        .build(nonce_before, value, sender, recipient, zero_blobs(1))?;
    env.record(format!("submit blob transaction {}", tx.hash()));
    let tx_hash = env.rpc.send_raw_transaction(tx.encoded_2718()).await?;
    ensure_eq("node transaction hash", tx.hash(), tx_hash, "eth_sendRawTransaction")?;
    info!(tx.hash = %tx_hash, %sender, %recipient, "blob transaction submitted");

    // Submitted -> Confirmed
    env.record(format!("await receipt {tx_hash}"));
    let receipt = env.tracker.await_receipt(tx_hash).await?;
    let context = format!("tx {tx_hash} in block {}", receipt.block_hash);
    ensure_eq("receipt status", true, receipt.success, &context)?;

    env.record(format!("fetch block {}", receipt.block_hash));
    let block = fetch_block(env, receipt.block_hash, &context).await?;
    let parent = fetch_block(env, block.parent_hash, &context).await?;

    // Confirmed -> Verified
    let block_excess = block.excess_data_gas.ok_or_else(|| {
        InvariantViolation::new("block excess data gas present", "a value", "none", &context)
    })?;
    let pricing_excess = env
        .model
        .pricing_excess(parent.excess_data_gas.unwrap_or_default(), block_excess);
    let data_gas_price = env.model.data_gas_price(pricing_excess);
    let data_gas_fee = env.model.data_gas_fee(pricing_excess, tx.blob_count());

    let execution_fee = U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price);
    let expected_balance = balance_before
        .checked_sub(value)
        .and_then(|b| b.checked_sub(execution_fee))
        .and_then(|b| b.checked_sub(U256::from(data_gas_fee)))
        .ok_or_else(|| {
            InvariantViolation::new(
                "sender can afford the transaction",
                format!("at least {}", value + execution_fee + U256::from(data_gas_fee)),
                balance_before,
                &context,
            )
        })?;

    env.record(format!("check balances of {sender} and {recipient}"));
    let balance_after = env.rpc.balance(sender).await?;
    ensure_eq("sender balance", expected_balance, balance_after, &context)?;

    if let Some(reported) = receipt.data_gas_price {
        ensure_eq("receipt data gas price", data_gas_price, reported, &context)?;
    }

    ensure_eq(
        "recipient balance",
        value,
        env.rpc.balance(recipient).await?,
        &context,
    )?;
    ensure_eq(
        "sender nonce",
        nonce_before + 1,
        env.rpc.nonce(sender).await?,
        &context,
    )?;

    let included = block.transaction(&tx_hash).ok_or_else(|| {
        InvariantViolation::new("block lists transaction", tx_hash, "absent", &context)
    })?;
    ensure_eq(
        "versioned hash count",
        tx.blob_count(),
        included.blob_versioned_hashes.len() as u64,
        &context,
    )?;

    info!(
        tx.hash = %tx_hash,
        block.number = receipt.block_number,
        pricing_excess,
        data_gas_price,
        data_gas_fee,
        "blob transaction verified"
    );
    Ok(InclusionReport {
        tx_hash,
        block_hash: receipt.block_hash,
        block_number: receipt.block_number,
        sender,
        recipient,
        value,
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        pricing_excess,
        data_gas_price,
        data_gas_fee,
        balance_before,
        balance_after,
    })
}
