use blobfee_harness::{Scenario, TestEnv};
use blobfee_rpc_client::AlloyRpc;
use blobfee_tx_builder::KzgCommitter;
use blobfee_types::HarnessConfig;
use clap::{Parser, Subcommand};
use eyre::WrapErr as _;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{layer::SubscriberExt as _, EnvFilter, Layer as _, Registry};

const DEFAULT_CONFIG: &str = "harness.toml";

#[derive(Debug, Clone, Parser)]
#[command(name = "blobfee", about = "Blob transaction and data gas conformance checks")]
pub struct BlobfeeCli {
    /// Harness config file. Falls back to $CONFIG, then ./harness.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(name = "run", about = "Run scenarios against the configured node")]
    Run {
        /// Scenario name, or `all` to run every scenario in order
        #[arg(short, long, default_value = "all", value_parser = parse_selection)]
        scenario: Selection,

        /// Overrides `rpc_url` from the config file
        #[arg(long)]
        rpc_url: Option<String>,

        /// Print one JSON summary per scenario to stdout
        #[arg(long)]
        json: bool,
    },
    #[command(name = "list", about = "List the available scenarios")]
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    One(Scenario),
}

impl Selection {
    fn scenarios(self) -> Vec<Scenario> {
        match self {
            Self::All => Scenario::all(),
            Self::One(scenario) => vec![scenario],
        }
    }
}

fn parse_selection(name: &str) -> Result<Selection, String> {
    if name == "all" {
        return Ok(Selection::All);
    }
    Scenario::from_str(name).map(Selection::One).map_err(|_| {
        let known = Scenario::all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("unknown scenario `{name}` (expected all, {known})")
    })
}

fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[tracing::instrument(level = "trace", skip_all)]
fn load_config(path: &Path) -> eyre::Result<HarnessConfig> {
    debug!("Loading config from {:?}", path);
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read config file at {path:?}"))?;
    let config = toml::from_str::<HarnessConfig>(&contents)
        .wrap_err_with(|| format!("Invalid config file at {path:?}"))?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let subscriber = Registry::default();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let output_layer = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_ansi(true)
        .with_file(true)
        .with_writer(std::io::stderr);

    let subscriber = subscriber
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer.boxed());

    subscriber.init();

    color_eyre::install()?;

    let args = BlobfeeCli::parse();

    match args.command {
        Commands::List => {
            for scenario in Scenario::all() {
                println!("{scenario}");
            }
            Ok(())
        }
        Commands::Run {
            scenario,
            rpc_url,
            json,
        } => {
            let mut config = load_config(&config_path(args.config))?;
            if let Some(rpc_url) = rpc_url {
                config.rpc_url = rpc_url;
            }
            run(config, &scenario.scenarios(), json).await
        }
    }
}

async fn run(config: HarnessConfig, scenarios: &[Scenario], json: bool) -> eyre::Result<()> {
    let rpc = AlloyRpc::connect(&config.rpc_url)?;
    info!(
        rpc_url = %config.rpc_url,
        rule = %config.fee_market.rule,
        preset = %config.fee_market.preset,
        counting = %config.scenarios.blob_counting,
        gap_policy = %config.scenarios.gap_policy,
        "connected to node"
    );
    let env = TestEnv::with_local_vault(config, Arc::new(rpc), Arc::new(KzgCommitter::new()))?;

    let outcomes = env.run_all(scenarios).await;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(_) => info!(scenario = %outcome.scenario, elapsed = ?outcome.elapsed, "PASS"),
            Err(err) => error!(
                scenario = %outcome.scenario,
                elapsed = ?outcome.elapsed,
                kind = err.kind(),
                "FAIL: {err}"
            ),
        }
        if json {
            println!("{}", serde_json::to_string(&outcome.summary())?);
        }
    }

    let failed = outcomes.iter().filter(|outcome| !outcome.passed()).count();
    if failed > 0 {
        eyre::bail!("{failed} of {} scenarios failed", outcomes.len());
    }
    info!(scenarios = outcomes.len(), "all scenarios passed");
    Ok(())
}
