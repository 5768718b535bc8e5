//! Logging setup for binaries embedding the display
//!
//! Stdout only. Set `DEBUG_LOGGING=1` to enable debug output for the
//! overlay crate; `RUST_LOG` overrides both defaults.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize stdout logging. Safe to call once per process.
pub fn init() {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE);

    let filter_directive = if debug_logging {
        // debug for this crate, info for dependencies
        "info,osd_overlay=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(filter)
        .init();

    tracing::debug!(debug_logging, "Logging initialized");
}
