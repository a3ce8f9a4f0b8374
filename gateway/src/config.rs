use bidder_dispatch::HttpClientConfig;
use serde::Deserialize;
use std::fs::File;
use upstream::GeoLocationConfig;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub bidder_http: HttpClientConfig,
    pub geolocation: Option<GeoLocationConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.validate()?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bidder_http
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("bidder_http: {e}")))?;

        if let Some(geolocation) = &self.geolocation {
            geolocation
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("geolocation: {e}")))?;
        }

        if let Some(metrics) = &self.metrics
            && metrics.statsd_host.is_empty()
        {
            return Err(ConfigError::Invalid(
                "metrics: statsd_host must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
