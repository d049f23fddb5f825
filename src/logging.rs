//! Logging setup for the `spark-vault` binary using `tracing-subscriber`.
//!
//! Library code only emits `tracing` events; this module decides where they go.
//! Output is written to stderr so it never mixes with command output.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set and no verbosity flag was given; otherwise our
/// crate logs at `level` and dependencies stay at warn.
pub fn init_logging(level: LevelFilter, flags_given: bool) {
    let filter = build_env_filter(level, flags_given);
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .init();
}

fn build_env_filter(level: LevelFilter, flags_given: bool) -> EnvFilter {
    let fallback = || {
        let level = level.to_string().to_lowercase();
        EnvFilter::new(format!(
            "warn,sparkvault={level},spark_vault={level}",
            level = level
        ))
    };
    if flags_given {
        return fallback();
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
}
