//! Tracing initialization (fmt subscriber with `RUST_LOG`-style filtering).
//!
//! Progress reporting for in-flight uploads is emitted through the same
//! tracing pipeline, so operators control its verbosity with the usual
//! `RUST_LOG` environment variable (e.g. `RUST_LOG=depot=debug` to see
//! per-chunk progress events).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize tracing with console output.
///
/// Defaults to `info` when `RUST_LOG` is unset.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
