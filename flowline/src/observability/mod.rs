//! Tracing setup for binaries and test harnesses embedding the core.

/// Installs a global `tracing` subscriber driven by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
