use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("opening threshold must be at least 1")]
    InvalidOpeningThreshold,

    #[error("opening window must be greater than 0")]
    InvalidOpeningWindow,

    #[error("closing delay must be greater than 0")]
    InvalidClosingDelay,
}

/// Circuit breaker configuration for one upstream class
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit
    pub opening_threshold: u32,
    /// Span, measured from the first failure of a run, in which the
    /// failures must accumulate. Failures are forgiven once it elapses.
    pub opening_window_ms: u64,
    /// How long the circuit stays open before a probe is let through
    pub closing_delay_ms: u64,
}

impl BreakerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.opening_threshold == 0 {
            return Err(ValidationError::InvalidOpeningThreshold);
        }
        if self.opening_window_ms == 0 {
            return Err(ValidationError::InvalidOpeningWindow);
        }
        if self.closing_delay_ms == 0 {
            return Err(ValidationError::InvalidClosingDelay);
        }
        Ok(())
    }

    pub fn opening_window(&self) -> Duration {
        Duration::from_millis(self.opening_window_ms)
    }

    pub fn closing_delay(&self) -> Duration {
        Duration::from_millis(self.closing_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BreakerConfig {
        BreakerConfig {
            opening_threshold: 3,
            opening_window_ms: 1000,
            closing_delay_ms: 5000,
        }
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
opening_threshold: 5
opening_window_ms: 10000
closing_delay_ms: 60000
"#;
        let config: BreakerConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.opening_threshold, 5);
        assert_eq!(config.opening_window(), Duration::from_secs(10));
        assert_eq!(config.closing_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = valid_config();
        config.opening_threshold = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidOpeningThreshold)
        );

        let mut config = valid_config();
        config.opening_window_ms = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidOpeningWindow));

        let mut config = valid_config();
        config.closing_delay_ms = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidClosingDelay));
    }

    #[test]
    fn test_missing_field() {
        assert!(serde_yaml::from_str::<BreakerConfig>("opening_threshold: 1").is_err());
    }
}
