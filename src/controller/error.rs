//! Error types for the GaleraCluster controller

use std::time::Duration;

use thiserror::Error;

use crate::resources::exec::ExecError;
use crate::resources::mysql::CredentialError;

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`).
/// This is idiomatic for error enums and improves readability at call sites.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Credential update error: {0}")]
    CredentialError(#[from] CredentialError),

    #[error("Remote command error: {0}")]
    ExecError(#[from] ExecError),

    #[error("Missing namespace in metadata")]
    MissingNamespace,

    #[error("Undefined or empty system account: {0}")]
    UndefinedAccount(String),

    #[error("Account value is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Proxy user sync failed: {0}")]
    ProxySyncFailed(String),

    #[error("{op}: {source}")]
    Context {
        op: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the name of the operation that produced it
    pub fn context(self, op: &'static str) -> Self {
        Error::Context {
            op,
            source: Box::new(self),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Kubernetes API errors are often retryable
            Error::KubeError(e) => {
                match e {
                    kube::Error::Api(api_err) => {
                        // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                        let code = api_err.code;
                        if (400..500).contains(&code) {
                            return code == 409 || code == 429;
                        }
                        // 5xx errors are retryable
                        true
                    }
                    // Network and other errors are retryable
                    _ => true,
                }
            }
            // Session construction and remote command failures are transient infrastructure
            Error::CredentialError(_) => true,
            Error::ExecError(_) => true,
            Error::ProxySyncFailed(_) => true,
            // A missing required account needs operator intervention
            Error::UndefinedAccount(_) => false,
            Error::InvalidUtf8(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingNamespace => false,
            Error::Context { source, .. } => source.is_retryable(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        // Apply jitter
        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // For non-retryable errors, use a longer fixed delay
            // This allows for manual intervention or eventual resolution
            self.max_delay
        }
    }
}
