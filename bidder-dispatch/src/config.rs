use circuit_breaker::BreakerConfig;
use serde::Deserialize;
use std::time::Duration;

/// Configuration of the HTTP transport used for partner calls
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct HttpClientConfig {
    /// Connect timeout; the per-call budget still bounds the whole exchange
    pub connect_timeout_ms: Option<u64>,
    /// Host-keyed circuit breaker wrapped around every partner call
    pub circuit_breaker: Option<BreakerConfig>,
}

impl HttpClientConfig {
    pub fn validate(&self) -> Result<(), circuit_breaker::ValidationError> {
        if let Some(breaker) = &self.circuit_breaker {
            breaker.validate()?;
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}
