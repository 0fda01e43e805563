//! Tracing setup for Undertow.
//!
//! Console output with env-filter control; `RUST_LOG` overrides the
//! default level passed by the embedding application.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes console tracing at the given default level.
///
/// `RUST_LOG` takes precedence when set. Calling more than once is safe;
/// later calls are no-ops.
pub fn init_tracing(default_level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(Level::DEBUG);
        init_tracing(Level::INFO);
        tracing::debug!("tracing initialized for tests");
    }
}
