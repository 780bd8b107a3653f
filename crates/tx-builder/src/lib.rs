pub mod builder;
pub mod committer;

pub use builder::{zero_blobs, BlobTxBuilder, NonceCounter};
pub use committer::{trusted_setup, BlobBundle, BlobCommitter, KzgCommitter};
