//! Logging setup (SPEC_FULL.md §B.1): `tracing-subscriber` with an
//! `EnvFilter`, plus `tracing-error` span-trace capture so `color_eyre`
//! reports carry a span trace. No panic hook here — that was the
//! teacher's TUI-specific concern and has no counterpart in a library.

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a global `tracing` subscriber driven by `RUST_LOG` (default
/// `info`), with span-trace capture wired in for `color_eyre`. Intended
/// to be called once, near process start, by the embedder — this crate
/// never calls it itself outside of tests.
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer())
    .with(ErrorLayer::default())
    .try_init();
}
