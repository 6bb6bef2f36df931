//! Logging initialization.
//!
//! This crate emits diagnostics through the `log` facade (`log::debug!`, `log::warn!`, ...)
//! rather than printing directly, so an embedding front end can route them anywhere. For test
//! binaries and examples, [`init`] wires up `env_logger` with a sensible default filter.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes `env_logger` once per process, honoring `RUST_LOG` if set. `verbose` raises the
/// default filter from `info` to `debug` when `RUST_LOG` is absent. Safe to call from every
/// test; subsequent calls are no-ops.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let default_level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        let _ = env_logger::builder().filter_level(default_level).parse_default_env().try_init();
    });
}

/// Initializes logging the way `#[test]` binaries want it: captured by the test harness rather
/// than printed straight to stderr.
pub fn init_for_tests() {
    INIT.call_once(|| {
        let _ = env_logger::builder().filter_level(log::LevelFilter::Info).parse_default_env().is_test(true).try_init();
    });
}
