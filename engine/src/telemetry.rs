//! Structured logging
//!
//! Installs the `tracing-subscriber` stack. `RUST_LOG` wins over the configured
//! level; debug builds print pretty lines, release builds print JSON with spans.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub fn filter_directive(log_level: &str) -> String {
    format!("{},interviewer_engine={}", log_level, log_level)
}

/// Install the subscriber with the configured level
///
/// A second call is a no-op; the first installed subscriber stays active.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}
