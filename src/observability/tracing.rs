//! Log subscriber bootstrap for courier binaries and tests.
//!
//! Token events carry `token_id`, `url` and `phase` fields; exchanges run
//! inside an `exchange` span. Output goes to stderr so that a CLI can keep
//! response bodies alone on stdout.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber for a binary.
///
/// `RUST_LOG` wins over `default_filter` (for example `"warn,courier=debug"`).
/// Installing twice is reported and otherwise ignored.
pub fn init_tracing(service_name: &str, default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr);

    match tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
    {
        Ok(()) => tracing::debug!(service = service_name, "Logging ready"),
        Err(e) => eprintln!("{service_name}: log subscriber already installed: {e}"),
    }
}

/// Subscriber for integration tests, captured by the test harness.
///
/// Errors only, unless `RUST_LOG` asks for more. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
