//! Tracing setup for the binary entrypoint. `RUST_LOG` (or `info` if unset)
//! drives the filter, following the same `fmt().with_env_filter(...)` setup
//! the project's own Axum demo uses.

use tracing_subscriber::EnvFilter;

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
