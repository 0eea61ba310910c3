//! Tracing setup.
//!
//! `RUST_LOG` wins when it is set. Otherwise the configured level applies to
//! this crate and every dependency logs at `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const FALLBACK_LEVEL: &str = "info";

/// Filter directive used when `RUST_LOG` is absent. Unknown level names fall
/// back to `info`.
pub fn default_directive(level: &str) -> String {
    let level = match level.trim().to_lowercase().as_str() {
        "warning" => "warn".to_string(),
        known @ ("error" | "warn" | "info" | "debug" | "trace") => known.to_string(),
        _ => FALLBACK_LEVEL.to_string(),
    };
    format!("lineage_hub={level},warn")
}

pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    // try_init: tests install a subscriber more than once
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
