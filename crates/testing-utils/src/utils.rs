use tracing_error::ErrorLayer;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer as _,
};

/// Installs a test-friendly subscriber so the tracing log macros (i.e `info!`)
/// show up in test output. Safe to call from every test; only the first call
/// installs anything.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_test_writer()
                .with_line_number(true)
                .with_file(true)
                .with_filter(filter),
        )
        .with(ErrorLayer::default())
        .try_init();
}
