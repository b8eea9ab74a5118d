//! Tracing setup for the tool runtime.

#![warn(missing_docs, clippy::pedantic)]

use std::sync::OnceLock;

use tool_config::{LogFormat, LoggingSection};
use tracing_subscriber::{EnvFilter, fmt};

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Builds the filter: `RUST_LOG` when set and valid, else `level`, else
/// `info`.
#[must_use]
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global fmt subscriber once.
///
/// Returns `true` when this process now logs through the subscriber built
/// here. Later calls are no-ops returning the first outcome; a subscriber
/// installed elsewhere makes it `false`.
pub fn init_tracing(logging: &LoggingSection) -> bool {
    *INSTALLED.get_or_init(|| {
        let builder = fmt()
            .with_env_filter(env_filter(&logging.level))
            .with_target(true)
            .with_level(true);
        let installed = match logging.format {
            LogFormat::Full => builder.try_init().is_ok(),
            LogFormat::Compact => builder.compact().try_init().is_ok(),
        };
        if installed {
            tracing::debug!(level = %logging.level, format = ?logging.format, "tracing initialised");
        }
        installed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_levels_fall_back() {
        let filter = env_filter("tool_router=[");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn initialisation_is_idempotent() {
        let logging = LoggingSection::default();
        let first = init_tracing(&logging);
        assert_eq!(init_tracing(&logging), first);
    }
}
