//! Test configuration helpers for mock-server and live-service runs

use replicate_dl::config::{ApiConfig, BatchConfig, PollConfig};
use replicate_dl::{Config, Credential};
use std::time::Duration;

/// Token expected by mock servers in the `Authorization` header
pub const TEST_TOKEN: &str = "r8_test_token";

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Credential matching [`TEST_TOKEN`]
pub fn test_credential() -> Credential {
    Credential::new(TEST_TOKEN)
}

/// Config pointed at a mock server with fast polling and no pacing
///
/// Polling uses real time because the HTTP calls do; keep intervals short.
pub fn mock_config(base_url: &str, max_attempts: u32) -> Config {
    Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        },
        polling: PollConfig {
            max_attempts,
            interval: Duration::from_millis(50),
            deadline: None,
        },
        batch: fast_batch(3),
        ..Config::default()
    }
}

/// Batch limits with no pacing delay
pub fn fast_batch(concurrency_limit: usize) -> BatchConfig {
    BatchConfig {
        concurrency_limit,
        pacing_delay: Duration::ZERO,
        cancel_remote_on_abort: false,
    }
}

/// Load the live service credential from `.env` or the environment
///
/// Required environment variables:
/// - `REPLICATE_API_TOKEN` - API token for the prediction service
pub fn load_live_credential() -> Result<Credential, ConfigError> {
    dotenvy::dotenv().ok();
    Credential::from_env().map_err(|e| ConfigError(e.to_string()))
}

/// Whether live credentials are available
pub fn has_live_credentials() -> bool {
    load_live_credential().is_ok()
}
