//! Thin facade over `tracing` (SPEC_FULL §A/§B): re-exports the macros every
//! other crate already calls directly, plus a single [`init`] helper the
//! composition root calls once at startup. Crates are free to depend on
//! `tracing` directly instead; this just gives `ba-client` one place to set
//! up the subscriber rather than duplicating `tracing_subscriber::fmt()`
//! boilerplate.

pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};

use tracing_subscriber::EnvFilter;

/// Installs a global fmt subscriber reading its filter from `RUST_LOG`,
/// falling back to `info` for this crate family and `warn` for everything
/// else. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ba_core=info,ba_resource=info,ba_network=info,ba_caches=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
