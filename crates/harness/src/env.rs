use crate::report::{OperationLog, ScenarioOutcome, ScenarioReport};
use crate::scenarios::{blob_transaction_test, fee_market_test};
use crate::Scenario;
use blobfee_fee_market::FeeMarketModel;
use blobfee_rpc_client::{NodeRpc, ReceiptTracker};
use blobfee_tx_builder::{BlobCommitter, BlobTxBuilder};
use blobfee_types::HarnessConfig;
use blobfee_vault::{LocalVault, Vault};
use eyre::OptionExt as _;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

/// Everything a scenario needs, wired from one [`HarnessConfig`].
///
/// Scenarios only read from the environment and hold no state between runs.
/// Runs on one environment are expected to be sequential because they share
/// the operation log.
pub struct TestEnv {
    pub config: HarnessConfig,
    pub rpc: Arc<dyn NodeRpc>,
    pub vault: Arc<dyn Vault>,
    pub builder: BlobTxBuilder,
    pub tracker: ReceiptTracker,
    pub model: FeeMarketModel,
    pub operations: OperationLog,
}

impl std::fmt::Debug for TestEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestEnv")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TestEnv {
    pub fn new(
        config: HarnessConfig,
        rpc: Arc<dyn NodeRpc>,
        vault: Arc<dyn Vault>,
        committer: Arc<dyn BlobCommitter>,
    ) -> Self {
        let model = FeeMarketModel::from_config(&config);
        let tracker = ReceiptTracker::new(Arc::clone(&rpc), &config.tracker);
        let builder = BlobTxBuilder::new(Arc::clone(&vault), committer, config.tx, model.params());
        Self {
            config,
            rpc,
            vault,
            builder,
            tracker,
            model,
            operations: OperationLog::default(),
        }
    }

    /// Environment backed by a [`LocalVault`] drawing on `config.faucet_key`.
    pub fn with_local_vault(
        config: HarnessConfig,
        rpc: Arc<dyn NodeRpc>,
        committer: Arc<dyn BlobCommitter>,
    ) -> eyre::Result<Self> {
        let faucet_key = config
            .faucet_key
            .as_deref()
            .ok_or_eyre("faucet_key is required to fund scenario accounts")?;
        let tracker = ReceiptTracker::new(Arc::clone(&rpc), &config.tracker);
        let vault = LocalVault::new(Arc::clone(&rpc), tracker, config.tx, faucet_key)?;
        Ok(Self::new(config, rpc, Arc::new(vault), committer))
    }

    pub fn record(&self, operation: impl Into<String>) {
        self.operations.record(operation);
    }

    /// Run one scenario to a pass/fail outcome.
    #[tracing::instrument(level = "trace", skip_all, fields(scenario = %scenario))]
    pub async fn run(&self, scenario: Scenario) -> ScenarioOutcome {
        self.operations.take();
        let started = Instant::now();
        info!(%scenario, "scenario started");

        let result = match scenario {
            Scenario::BlobTransaction => blob_transaction_test(self)
                .await
                .map(ScenarioReport::Inclusion),
            Scenario::FeeMarket => fee_market_test(self).await.map(ScenarioReport::FeeMarket),
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => info!(%scenario, ?elapsed, "scenario passed"),
            Err(err) => error!(%scenario, ?elapsed, kind = err.kind(), %err, "scenario failed"),
        }
        ScenarioOutcome {
            scenario,
            result,
            operations: self.operations.take(),
            elapsed,
        }
    }

    /// Run `scenarios` in order, continuing past failures.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for &scenario in scenarios {
            outcomes.push(self.run(scenario).await);
        }
        outcomes
    }
}
