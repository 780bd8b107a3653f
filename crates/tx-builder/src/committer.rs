use alloy_eips::eip4844::{env_settings::EnvKzgSettings, BlobTransactionSidecar};
use blobfee_types::{Blob, BuildError, B256};
use c_kzg::KzgSettings;
use std::sync::OnceLock;

/// Stack for threads that touch the trusted setup or run blob proofs. Loading
/// the setup overflows the default 8MB thread stack.
const KZG_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Sidecar plus the versioned hashes derived from its commitments, in blob
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobBundle {
    pub sidecar: BlobTransactionSidecar,
    pub versioned_hashes: Vec<B256>,
}

impl BlobBundle {
    pub fn new(sidecar: BlobTransactionSidecar) -> Self {
        let versioned_hashes = sidecar.versioned_hashes().collect();
        Self {
            sidecar,
            versioned_hashes,
        }
    }
}

/// Produces commitments and proofs for a list of blobs.
pub trait BlobCommitter: Send + Sync + 'static {
    fn commit(&self, blobs: Vec<Blob>) -> Result<BlobBundle, BuildError>;
}

/// Commits with the Ethereum KZG trusted setup, one proof per blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct KzgCommitter;

impl KzgCommitter {
    pub fn new() -> Self {
        Self
    }
}

impl BlobCommitter for KzgCommitter {
    fn commit(&self, blobs: Vec<Blob>) -> Result<BlobBundle, BuildError> {
        let settings = trusted_setup()?;
        let sidecar = on_kzg_thread(move || {
            BlobTransactionSidecar::try_from_blobs_with_settings(blobs, settings)
                .map_err(|e| BuildError::Commitment(e.to_string()))
        })??;
        Ok(BlobBundle::new(sidecar))
    }
}

/// The lazily loaded Ethereum trusted setup.
pub fn trusted_setup() -> Result<&'static KzgSettings, BuildError> {
    static SETTINGS: OnceLock<&'static KzgSettings> = OnceLock::new();
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }
    let settings = on_kzg_thread(|| EnvKzgSettings::Default.get())?;
    Ok(SETTINGS.get_or_init(|| settings))
}

fn on_kzg_thread<T: Send>(f: impl FnOnce() -> T + Send) -> Result<T, BuildError> {
    std::thread::scope(|scope| {
        std::thread::Builder::new()
            .name("kzg".into())
            .stack_size(KZG_STACK_SIZE)
            .spawn_scoped(scope, f)
            .map_err(|e| BuildError::Commitment(format!("failed to spawn KZG thread: {e}")))?
            .join()
            .map_err(|_| BuildError::Commitment("KZG thread panicked".to_owned()))
    })
}
