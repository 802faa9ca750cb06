//! Logging setup for the herd simulator.
//!
//! - Filtering comes from `RUST_LOG`, defaulting to `info`. Use
//!   `RUST_LOG=cooperation=debug` to see admission and publication events
//!   from the coordinator itself.
//! - Each line carries the thread id, file and line number, and a local
//!   RFC 3339 timestamp.
//! - Logs go to stderr so that `--json` output on stdout stays parseable.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()?;
    Ok(())
}
