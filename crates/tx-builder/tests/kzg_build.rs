use blobfee_rpc_client::{NodeRpc as _, ReceiptTracker};
use blobfee_testing_utils::{MockNode, DEV_FAUCET_KEY};
use blobfee_tx_builder::{zero_blobs, BlobTxBuilder, KzgCommitter, NonceCounter};
use blobfee_types::{BlobTransaction, HarnessConfig, ETHER, U256};
use blobfee_vault::{LocalVault, Vault as _};
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Fixture {
    node: Arc<MockNode>,
    vault: Arc<LocalVault>,
    builder: BlobTxBuilder,
    tracker: ReceiptTracker,
}

fn fixture() -> eyre::Result<Fixture> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    let tracker = ReceiptTracker::new(node.clone(), &config.tracker);
    let vault = Arc::new(LocalVault::new(
        node.clone(),
        tracker.clone(),
        config.tx,
        DEV_FAUCET_KEY,
    )?);
    let builder = BlobTxBuilder::new(
        vault.clone(),
        Arc::new(KzgCommitter::new()),
        config.tx,
        &config.fee_market.params(),
    );
    Ok(Fixture {
        node,
        vault,
        builder,
        tracker,
    })
}

#[test_log::test(tokio::test)]
async fn kzg_built_transaction_is_accepted_and_mined() -> eyre::Result<()> {
    let Fixture {
        node,
        vault,
        builder,
        tracker,
    } = fixture()?;
    let sender = vault.create_account(Some(U256::from(ETHER))).await?;
    let recipient = vault.create_account(None).await?;

    let tx = builder.build(0, U256::from(7), sender, recipient, zero_blobs(2))?;
    assert_eq!(tx.blob_versioned_hashes().len(), 2);
    assert!(tx.blob_versioned_hashes().iter().all(|hash| hash[0] == 0x01));

    let tx_hash = node.send_raw_transaction(tx.encoded_2718()).await?;
    assert_eq!(tx_hash, tx.hash());
    let receipt = tracker.await_receipt(tx_hash).await?;

    assert!(receipt.success);
    assert_eq!(receipt.data_gas_used, Some(2 * 131_072));
    assert_eq!(node.balance(recipient).await?, U256::from(7));
    let block = node
        .block_by_hash(receipt.block_hash)
        .await?
        .expect("receipt points at a block");
    assert_eq!(
        block.transaction(&tx_hash).map(|t| t.blob_versioned_hashes.clone()),
        Some(tx.blob_versioned_hashes().to_vec())
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn encoded_transaction_decodes_to_the_same_blob_transaction() -> eyre::Result<()> {
    let Fixture { vault, builder, .. } = fixture()?;
    let sender = vault.create_account(None).await?;

    let tx = builder.build(4, U256::ZERO, sender, sender, zero_blobs(1))?;
    let decoded = BlobTransaction::try_from(tx.envelope())?;

    assert_eq!(decoded.hash(), tx.hash());
    assert_eq!(decoded.nonce(), 4);
    assert_eq!(decoded.sidecar(), tx.sidecar());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn sequential_builds_take_consecutive_nonces() -> eyre::Result<()> {
    let Fixture {
        node,
        vault,
        builder,
        tracker,
    } = fixture()?;
    let sender = vault.create_account(Some(U256::from(ETHER))).await?;
    let mut nonces = NonceCounter::new(node.nonce(sender).await?);

    for _ in 0..3 {
        let tx = builder.build(nonces.assign(), U256::ZERO, sender, sender, zero_blobs(1))?;
        let tx_hash = node.send_raw_transaction(tx.encoded_2718()).await?;
        tracker.await_receipt(tx_hash).await?;
    }

    assert_eq!(node.nonce(sender).await?, 3);
    assert_eq!(nonces.peek(), 3);
    Ok(())
}
