//! Configuration for the default HTTP transport.
//!
//! Supports:
//! - CLI arguments via clap (flatten [`ClientConfig`] into a parser)
//! - Environment variable overrides
//! - Sensible defaults for library use

use clap::Args;
use std::time::Duration;

/// Settings applied when building a [`crate::ReqwestTransport`].
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Total request timeout in seconds (0 disables)
    #[arg(long = "timeout", env = "COURIER_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Connection timeout in seconds (0 disables)
    #[arg(
        long = "connect-timeout",
        env = "COURIER_CONNECT_TIMEOUT_SECS",
        default_value_t = 10
    )]
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[arg(long, env = "COURIER_USER_AGENT", default_value_t = default_user_agent())]
    pub user_agent: String,

    /// Ignore proxy settings from the environment
    #[arg(long, env = "COURIER_NO_PROXY")]
    pub no_proxy: bool,
}

fn default_user_agent() -> String {
    format!("courier/{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_secs > 0).then(|| Duration::from_secs(self.connect_timeout_secs))
    }

    /// Create a configuration for loopback tests: short timeouts, no proxy.
    pub fn test_config() -> Self {
        Self {
            timeout_secs: 5,
            connect_timeout_secs: 2,
            user_agent: "courier-test".into(),
            no_proxy: true,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: default_user_agent(),
            no_proxy: false,
        }
    }
}
