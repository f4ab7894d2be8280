//! Tracing subscriber setup. The teacher's `telemetry.rs` wires an OTLP
//! exporter; this crate's dependency set carries only `tracing-subscriber`,
//! so initialization stops at the local formatter and env-filter layer
//! (DESIGN.md notes the OTel drop).

use tracing_subscriber::EnvFilter;

use crate::log_format::TargetFirstFormat;

/// Install the global tracing subscriber. `RUST_LOG` controls verbosity
/// (default `info`); panics if called more than once in a process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .event_format(TargetFirstFormat)
        .with_env_filter(filter)
        .init();
}
