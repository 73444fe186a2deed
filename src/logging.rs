//! Logging setup for the `cdfs` binary.
//!
//! Library code only emits `tracing` events; the binary installs a `fmt` subscriber
//! writing to stderr, filtered by `RUST_LOG` or, failing that, by the `--debug` flag.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
pub fn default_level(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global subscriber. Call once, before any event is emitted.
///
/// A second call is harmless: the already installed subscriber stays in place.
pub fn init(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
