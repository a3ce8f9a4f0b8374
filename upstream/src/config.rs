use circuit_breaker::BreakerConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("address pool must list at least one address")]
    EmptyAddresses,

    #[error("refresh interval must be greater than 0")]
    InvalidRefreshInterval,

    #[error("lookup path must start with '/': {0}")]
    InvalidPath(String),

    #[error("lookup timeout must be greater than 0")]
    InvalidTimeout,

    #[error("circuit breaker: {0}")]
    CircuitBreaker(#[from] circuit_breaker::ValidationError),
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_path() -> String {
    "/geo".to_string()
}

fn default_timeout_ms() -> u64 {
    50
}

/// Addresses of interchangeable instances of one upstream service
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// `host:port` entries; each must resolve at startup
    pub addresses: Vec<String>,
    /// How often the live set is reset to the full configured set
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.addresses.is_empty() {
            return Err(ValidationError::EmptyAddresses);
        }
        if self.refresh_interval_secs == 0 {
            return Err(ValidationError::InvalidRefreshInterval);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Geolocation lookup service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GeoLocationConfig {
    #[serde(flatten)]
    pub pool: PoolConfig,
    #[serde(default = "default_path")]
    pub path: String,
    /// Upper bound for a single lookup, further capped by the caller's budget
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub circuit_breaker: BreakerConfig,
}

impl GeoLocationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pool.validate()?;
        self.circuit_breaker.validate()?;

        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidPath(self.path.clone()));
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
