//! Process-wide `tracing` setup.
//!
//! Output goes to stderr so JSON written to stdout by the CLI stays clean.
//! Verbosity follows `RUST_LOG` and defaults to `info`.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the fmt subscriber. Safe to call more than once; only the first call
/// has an effect, and an already-installed global subscriber is left alone.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
