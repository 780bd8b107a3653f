//! Contains a common set of types used across all of the `blobfee` crates.
//!
//! Configuration records, the chain data observed through RPC, the signed blob
//! transaction wrapper and the error taxonomy shared by every scenario live here,
//! so the collaborator crates can agree on them without depending on each other.
pub mod blob_transaction;
pub mod chain;
pub mod config;
pub mod error;

pub use blob_transaction::*;
pub use chain::*;
pub use config::*;
pub use error::*;

pub use alloy_eips::eip4844::Blob;
pub use alloy_primitives::{Address, Bytes, B256, U256};

/// One ether in wei, the default funding of a scenario sender.
pub const ETHER: u128 = 1_000_000_000_000_000_000;
