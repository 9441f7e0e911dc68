//! Logging setup based on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "debug,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Install the global tracing subscriber with Ember's default filter.
///
/// The filter keeps Ember crates verbose while quieting the GPU stack;
/// override it with the `RUST_LOG` environment variable.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .init();
}
