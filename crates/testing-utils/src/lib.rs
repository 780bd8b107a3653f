pub mod mock_node;
pub mod utils;

pub use mock_node::{Mining, MockNode, MockNodeConfig, DEV_FAUCET, DEV_FAUCET_KEY};
pub use utils::setup_tracing;
