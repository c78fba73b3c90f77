//! Logging setup for upp
//!
//! The library only emits through the `log` facade. Binaries and tests pick a
//! backend here; `env_logger` is the one we ship.
//!
//! Levels as used by the engine:
//!
//! - `warn!` - upward-navigation advisories, unknown macros
//! - `info!` - pass progress
//! - `debug!` - reparses, dropped replacements, swallowed traversal errors
//! - `trace!` - individual splices and matcher steps
//!
//! ```bash
//! RUST_LOG=debug upp expand input.c
//! RUST_LOG=upp::tracker=trace upp expand input.c
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at Warn level. Subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level. Subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to Warn.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Logging for tests: captured output, never panics on double init.
pub fn init_test() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Warn)
        .is_test(true)
        .try_init();
}
