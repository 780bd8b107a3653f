use blobfee_fee_market::FeeMarketModel;
use blobfee_harness::{blob_transaction_test, fee_market_test, Scenario, ScenarioReport, TestEnv};
use blobfee_testing_utils::{Mining, MockNode, MockNodeConfig};
use blobfee_tx_builder::KzgCommitter;
use blobfee_types::{
    ExcessRule, FeeMarketError, GapPolicy, HarnessConfig, HarnessError, InvariantViolation, U256,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;

const MINER_INTERVAL: Duration = Duration::from_millis(50);

fn env(config: HarnessConfig, node: &Arc<MockNode>) -> eyre::Result<TestEnv> {
    TestEnv::with_local_vault(config, node.clone(), Arc::new(KzgCommitter::new()))
}

fn invariant(err: HarnessError) -> InvariantViolation {
    match err {
        HarnessError::Invariant(violation) => violation,
        other => panic!("expected an invariant violation, got {other}"),
    }
}

/// A node that only mines on a timer, so concurrent submissions share blocks.
fn mining_node(config: &HarnessConfig) -> Arc<MockNode> {
    let node_config = MockNodeConfig {
        mining: Mining::Manual,
        ..MockNodeConfig::for_harness(config)
    };
    let node = MockNode::new(node_config, FeeMarketModel::from_config(config));
    node.spawn_miner(MINER_INTERVAL);
    node
}

#[rstest]
#[case::draft(ExcessRule::Draft)]
#[case::cancun(ExcessRule::Cancun)]
#[test_log::test(tokio::test)]
async fn inclusion_accounts_for_every_wei(#[case] rule: ExcessRule) -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.fee_market.rule = rule;
    let node = MockNode::new(
        MockNodeConfig {
            genesis_excess: 10 * 2_225_652,
            ..MockNodeConfig::for_harness(&config)
        },
        FeeMarketModel::from_config(&config),
    );
    let env = env(config, &node)?;

    let report = blob_transaction_test(&env).await?;

    assert_eq!(report.value, U256::from(1234));
    assert_eq!(report.balance_before, U256::from(1_000_000_000_000_000_000_u128));
    assert!(report.data_gas_price > 1, "excess should lift the price");
    assert_eq!(report.data_gas_fee, 131_072 * report.data_gas_price);
    let spent = U256::from(report.gas_used) * U256::from(report.effective_gas_price)
        + U256::from(report.data_gas_fee)
        + report.value;
    assert_eq!(report.balance_before - report.balance_after, spent);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn induction_matches_every_block() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = mining_node(&config);
    let env = env(config, &node)?;

    let report = fee_market_test(&env).await?;

    assert_eq!(report.tx_hashes.len(), 20);
    assert!(report.bridged.is_empty());
    let blobs: u64 = report.blocks.iter().map(|block| block.blob_count).sum();
    assert_eq!(blobs, 20);
    assert!(report.blocks.iter().all(|block| block.blob_count <= 4));
    assert!(
        report.blocks.windows(2).all(|w| w[0].number + 1 == w[1].number),
        "verified blocks are consecutive"
    );
    // full blocks are above the two blob target, so the excess has to climb
    let last = report.blocks.last().expect("at least one block");
    assert!(last.excess_data_gas > 0);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn induction_under_cancun_rule() -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.fee_market.rule = ExcessRule::Cancun;
    let node = mining_node(&config);
    let env = env(config, &node)?;

    let report = fee_market_test(&env).await?;

    // the first block only sees the anchor's blobs
    assert_eq!(report.blocks[0].excess_data_gas, 0);
    let blobs: u64 = report.blocks.iter().map(|block| block.blob_count).sum();
    assert_eq!(blobs, 20);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn corrupted_excess_is_a_mismatch() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = mining_node(&config);
    // block 1 carries the funding transfer, block 2 the first blob transactions
    node.corrupt_excess_at(2, 12_345);
    let env = env(config, &node)?;

    let err = fee_market_test(&env).await.unwrap_err();

    match err {
        HarnessError::FeeMarket(FeeMarketError::Mismatch { number, actual, .. }) => {
            assert_eq!((number, actual), (2, 12_345));
        }
        other => panic!("expected a mismatch, got {other}"),
    }
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn node_following_another_rule_is_caught() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node_model = FeeMarketModel::new(
        config.fee_market.params(),
        ExcessRule::Cancun,
        config.scenarios.blob_counting,
    );
    let node = MockNode::new(
        MockNodeConfig {
            mining: Mining::Manual,
            ..MockNodeConfig::for_harness(&config)
        },
        node_model,
    );
    node.spawn_miner(MINER_INTERVAL);
    let env = env(config, &node)?;

    let err = fee_market_test(&env).await.unwrap_err();

    assert!(
        matches!(err, HarnessError::FeeMarket(FeeMarketError::Mismatch { .. })),
        "{err}"
    );
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn omitted_excess_is_reported() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = mining_node(&config);
    node.omit_excess_at(2);
    let env = env(config, &node)?;

    let err = fee_market_test(&env).await.unwrap_err();

    match err {
        HarnessError::FeeMarket(FeeMarketError::MissingExcess { number, .. }) => {
            assert_eq!(number, 2);
        }
        other => panic!("expected a missing excess, got {other}"),
    }
    Ok(())
}

#[rstest]
#[case::reject(GapPolicy::Reject)]
#[case::bridge(GapPolicy::Bridge)]
#[test_log::test(tokio::test(start_paused = true))]
async fn empty_blocks_between_observed_blocks(#[case] policy: GapPolicy) -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.scenarios.gap_policy = policy;
    let node = mining_node(&config);
    node.insert_empty_blocks(true);
    let env = env(config, &node)?;

    let result = fee_market_test(&env).await;

    match (policy, result) {
        (GapPolicy::Reject, Err(HarnessError::FeeMarket(FeeMarketError::ChainGap { .. }))) => {}
        (GapPolicy::Bridge, Ok(report)) => {
            assert!(!report.bridged.is_empty());
            for number in &report.bridged {
                let block = report
                    .blocks
                    .iter()
                    .find(|block| block.number == *number)
                    .expect("bridged block is verified");
                assert_eq!(block.blob_count, 0);
            }
            let blobs: u64 = report.blocks.iter().map(|block| block.blob_count).sum();
            assert_eq!(blobs, 20);
        }
        (policy, result) => panic!("unexpected outcome under {policy:?}: {result:?}"),
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn receipt_transport_error_fails_fast() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    node.fail_receipt_queries(1);
    let env = env(config, &node)?;

    let err = blob_transaction_test(&env).await.unwrap_err();

    assert_eq!(err.kind(), "transport");
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn dropped_blob_transaction_times_out() -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.tracker.receipt_timeout_ms = 500;
    let node = MockNode::for_harness(&config);
    node.drop_blob_submissions(1);
    let env = env(config, &node)?;

    let err = blob_transaction_test(&env).await.unwrap_err();

    match err {
        HarnessError::Timeout { waited, polls, .. } => {
            assert_eq!(waited, Duration::from_millis(500));
            assert!(polls > 1);
        }
        other => panic!("expected a timeout, got {other}"),
    }
    assert_eq!(node.pending_count(), 0);
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn dropped_induction_transaction_aborts_the_scenario() -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.tracker.receipt_timeout_ms = 1_000;
    let node = mining_node(&config);
    node.drop_blob_submissions(1);
    let env = env(config, &node)?;

    let err = fee_market_test(&env).await.unwrap_err();

    assert_eq!(err.kind(), "timeout");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn run_records_operations_and_outcome() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    let env = env(config, &node)?;

    let outcome = env.run(Scenario::BlobTransaction).await;

    assert!(outcome.passed(), "{:?}", outcome.result);
    assert!(matches!(outcome.result, Ok(ScenarioReport::Inclusion(_))));
    assert_eq!(outcome.operations[0], "create funded sender");
    assert!(outcome
        .operations
        .iter()
        .any(|op| op.starts_with("submit blob transaction")));
    let summary = outcome.summary();
    assert!(summary.passed);
    assert_eq!(summary.error_kind, None);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn run_all_continues_past_failures() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    node.fail_receipt_queries(1);
    let env = env(config, &node)?;

    let outcomes = env.run_all(&Scenario::all()).await;

    let passed = outcomes.iter().map(|o| (o.scenario, o.passed())).collect::<Vec<_>>();
    assert_eq!(
        passed,
        vec![(Scenario::BlobTransaction, false), (Scenario::FeeMarket, true)]
    );
    assert_eq!(outcomes[0].summary().error_kind, Some("transport"));
    // each run starts with a fresh operation log
    assert_eq!(outcomes[1].operations[0], "create funded sender");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn missing_faucet_key_is_a_config_error() {
    let mut config = HarnessConfig::testing();
    config.faucet_key = None;
    let node = MockNode::for_harness(&config);

    let err = env(config, &node).unwrap_err();

    assert!(err.to_string().contains("faucet_key"));
}

#[rstest]
#[case::defaults(1_234, 7, 1_000_000_000, 0)]
#[case::zero_value_no_tip(0, 1, 0, 0)]
#[case::large_value_high_base_fee(100_000_000_000_000_000, 25_000_000_000, 2_000_000_000, 20 * 2_225_652)]
#[case::tip_capped_by_max_fee(5, 29_500_000_000, 1_000_000_000, 3 * 2_225_652)]
#[test_log::test(tokio::test)]
async fn value_is_conserved_modulo_fees(
    #[case] value: u128,
    #[case] base_fee: u64,
    #[case] tip: u128,
    #[case] genesis_excess: u64,
) -> eyre::Result<()> {
    let mut config = HarnessConfig::testing();
    config.scenarios.inclusion_value = value;
    config.tx.max_priority_fee_per_gas = tip;
    let node = MockNode::new(
        MockNodeConfig {
            base_fee,
            genesis_excess,
            ..MockNodeConfig::for_harness(&config)
        },
        FeeMarketModel::from_config(&config),
    );
    let max_fee = config.tx.max_fee_per_gas;
    let env = env(config, &node)?;

    let report = blob_transaction_test(&env).await?;

    assert_eq!(
        report.effective_gas_price,
        max_fee.min(u128::from(base_fee) + tip)
    );
    let fees = U256::from(report.gas_used) * U256::from(report.effective_gas_price)
        + U256::from(report.data_gas_fee);
    assert_eq!(
        report.balance_before,
        report.balance_after + U256::from(value) + fees
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn overcharged_sender_is_a_balance_violation() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    node.overcharge_blob_senders(U256::from(99));
    let env = env(config, &node)?;

    let violation = invariant(blob_transaction_test(&env).await.unwrap_err());

    assert_eq!(violation.check, "sender balance");
    let expected = violation.expected.parse::<U256>().unwrap();
    let actual = violation.actual.parse::<U256>().unwrap();
    assert_eq!(expected - actual, U256::from(99));
    assert!(violation.context.starts_with("tx 0x"), "{}", violation.context);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn reverted_blob_transaction_fails_inclusion() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    node.fail_blob_executions(1);
    let env = env(config, &node)?;

    let violation = invariant(blob_transaction_test(&env).await.unwrap_err());

    assert_eq!(violation.check, "receipt status");
    assert_eq!((violation.expected.as_str(), violation.actual.as_str()), ("true", "false"));
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn reverted_blob_transaction_fails_induction() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = mining_node(&config);
    node.fail_blob_executions(1);
    let env = env(config, &node)?;

    let violation = invariant(fee_market_test(&env).await.unwrap_err());

    assert_eq!(violation.check, "receipt status");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn misreported_data_gas_price_fails_inclusion() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = MockNode::for_harness(&config);
    node.misreport_data_gas_price(42);
    let env = env(config, &node)?;

    let violation = invariant(blob_transaction_test(&env).await.unwrap_err());

    assert_eq!(violation.check, "receipt data gas price");
    assert_eq!((violation.expected.as_str(), violation.actual.as_str()), ("1", "42"));
    Ok(())
}

#[test_log::test(tokio::test(start_paused = true))]
async fn misreported_data_gas_price_fails_induction() -> eyre::Result<()> {
    let config = HarnessConfig::testing();
    let node = mining_node(&config);
    node.misreport_data_gas_price(42);
    let env = env(config, &node)?;

    let violation = invariant(fee_market_test(&env).await.unwrap_err());

    assert_eq!(violation.check, "receipt data gas price");
    assert_eq!(violation.actual, "42");
    Ok(())
}
