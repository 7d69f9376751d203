//! Logging configuration using tracing
//!
//! Structured diagnostics go to stderr; the run report itself is printed to
//! stdout by the CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "warn,billpull=info";

/// Initialize the tracing subscriber
///
/// # Example RUST_LOG values
/// - `RUST_LOG=debug` - Show debug and above
/// - `RUST_LOG=billpull=trace,webdriver=debug` - Different levels per crate
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init() -> crate::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::BillsError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        init_test();
        init_test(); // Can be called multiple times
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
