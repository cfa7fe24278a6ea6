//! Logging utilities with Tabula segment prefixes.
//!
//! Library code only emits `tracing` events. Native hosts can install a
//! subscriber with [`init`]; browser hosts route events however they like.

#[cfg(feature = "subscriber")]
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with Tabula defaults.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
#[cfg(feature = "subscriber")]
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// Does nothing if a global subscriber is already installed.
#[cfg(feature = "subscriber")]
pub fn init_with_filter(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Segment prefixes for log lines.
pub mod prefix {
    /// Database operations prefix
    pub const DB: &str = "⊔";
    /// Connection opened prefix
    pub const OPEN: &str = "✿";
}
