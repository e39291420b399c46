//! Configuration types for replicate-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable holding the service token
pub const TOKEN_ENV_VAR: &str = "REPLICATE_API_TOKEN";

/// Remote service endpoint and HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the prediction API (default: "https://api.replicate.com/v1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout, covering connect and body (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Connection establishment timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Status polling budget for a single job
///
/// The wall-clock ceiling of a poll is roughly `interval × max_attempts`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of status queries per job (default: 60)
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,

    /// Wait between status queries (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Optional wall-clock limit for the whole poll, on top of the attempt budget
    #[serde(default, with = "optional_duration_serde")]
    pub deadline: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            interval: default_poll_interval(),
            deadline: None,
        }
    }
}

/// Batch scheduling limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum pipelines in flight at once (default: 3)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Minimum gap between successive submissions (default: 1 second)
    ///
    /// Applies even when the concurrency limit would allow an immediate start,
    /// to stay under per-account rate limits.
    #[serde(default = "default_pacing_delay", with = "duration_serde")]
    pub pacing_delay: Duration,

    /// Ask the service to cancel jobs abandoned by cancellation (default: false)
    #[serde(default)]
    pub cancel_remote_on_abort: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            pacing_delay: default_pacing_delay(),
            cancel_remote_on_abort: false,
        }
    }
}

/// Where the default file sink writes artifacts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "generated_assets")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File collision handling
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Main configuration for [`BatchOrchestrator`](crate::BatchOrchestrator)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Service endpoint and HTTP timeouts
    #[serde(default)]
    pub api: ApiConfig,

    /// Per-job polling budget
    #[serde(default)]
    pub polling: PollConfig,

    /// Default batch limits
    #[serde(default)]
    pub batch: BatchConfig,

    /// File sink settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Caller-side retry of submission transport failures (default: disabled)
    ///
    /// Submissions are otherwise made exactly once. Enabling this departs from that
    /// contract: a submit whose reply was lost in transit may have created a job
    /// remotely, and the resubmission creates a second one. Rejections are never
    /// resubmitted, and no attempt starts after the batch is cancelled.
    #[serde(default = "default_submit_retry")]
    pub submit_retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            polling: PollConfig::default(),
            batch: BatchConfig::default(),
            output: OutputConfig::default(),
            submit_retry: default_submit_retry(),
        }
    }
}

impl Config {
    /// Check settings that would make every pipeline fail or stall
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.api.base_url) {
            return Err(Error::config(
                "api.base_url",
                format!("invalid base URL '{}': {}", self.api.base_url, e),
            ));
        }
        if self.batch.concurrency_limit == 0 {
            return Err(Error::config(
                "batch.concurrency_limit",
                "concurrency limit must be at least 1",
            ));
        }
        if self.polling.interval.is_zero() {
            return Err(Error::config(
                "polling.interval",
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Refuse to store, keep existing
    Skip,
}

/// Static bearer token for the prediction service
///
/// Loaded once at process start and passed explicitly into every call.
/// The token never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the token from `REPLICATE_API_TOKEN`
    pub fn from_env() -> Result<Self> {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.trim().is_empty() => Ok(Self(token.trim().to_string())),
            _ => Err(Error::config(
                TOKEN_ENV_VAR,
                format!("{} is not set", TOKEN_ENV_VAR),
            )),
        }
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

// Default value functions
fn default_base_url() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_attempts() -> u32 {
    60
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_pacing_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_assets")
}

fn default_submit_retry() -> RetryConfig {
    RetryConfig::disabled()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
//
// Durations are written as seconds. Whole seconds stay integers; anything finer
// is written as a fraction, so sub-second values survive a round trip.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        from_secs::<D::Error>(secs)
    }

    pub(super) fn from_secs<E: serde::de::Error>(secs: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(secs)
            .map_err(|e| E::custom(format!("invalid duration {secs}: {e}")))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) if d.subsec_nanos() == 0 => serializer.serialize_some(&d.as_secs()),
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<f64>::deserialize(deserializer)?
            .map(super::duration_serde::from_secs::<D::Error>)
            .transpose()
    }
}
