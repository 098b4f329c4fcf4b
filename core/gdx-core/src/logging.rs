//! Logging utilities for GDX
//!
//! The engine only emits `tracing` events. Spans worth knowing about:
//!
//! - `search`, `reconcile`, `apply_schema_batch`, `compact`, `open_with_config`
//!
//! Reconcile state transitions are logged at `debug` under
//! `gdx_core::reconcile`, commits at `debug` under `gdx_core::api::session`.
//! With the `logging` feature the helpers below install a `tracing-subscriber`
//! fmt subscriber; without it they do nothing.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable read before `RUST_LOG`.
pub const LOG_ENV: &str = "GDX_LOG";

/// Default directives: engine at `info`, everything else at `warn`.
pub const DEFAULT_DIRECTIVES: &str = "warn,gdx_core=info";

#[cfg(feature = "logging")]
fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initialize logging with default settings
///
/// # Environment Variables
/// - `GDX_LOG`, then `RUST_LOG` - filter directives (default: [`DEFAULT_DIRECTIVES`])
///
/// # Example
/// ```rust
/// gdx_core::logging::init();
/// ```
#[cfg(feature = "logging")]
pub fn init() {
    init_with_directives(DEFAULT_DIRECTIVES)
}

/// Initialize logging with explicit filter directives,
/// e.g. `"gdx_core::reconcile=debug"`. The environment still wins.
///
/// Installing twice is a no-op.
#[cfg(feature = "logging")]
pub fn init_with_directives(directives: &str) {
    let _ = fmt()
        .with_env_filter(env_filter(directives))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

/// Initialize logging for tests
///
/// Debug output of the engine, captured per test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(env_filter("gdx_core=debug"))
        .with_test_writer()
        .try_init();
}

// Stub implementations when logging feature is disabled
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_directives(_directives: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
