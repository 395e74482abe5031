//! Helpers related to tracing, used by main entrypoints

use tracing_subscriber::EnvFilter;

/// Initialize tracing with the default configuration.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`; output goes
/// to stderr so that stdout stays usable for command output.
pub fn initialize_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Don't include timestamps and such because they're not really useful and
    // too verbose, and plus several log targets such as journald will already
    // include timestamps.
    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}
