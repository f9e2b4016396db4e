#![forbid(unsafe_code)]

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber for the binaries. `RUST_LOG` wins; otherwise
/// `default_directive` applies. Logs go to stderr so stdout only carries the
/// run report.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
