//! Process wiring of the auction gateway's dispatch and resilience core.

pub mod config;

use bidder_dispatch::{BreakerTransport, Dispatcher, HttpTransport, HyperTransport};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use upstream::{GeoLocationClient, LiveAddressPool, PoolError};

const METRICS_PREFIX: &str = "gateway";

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("geolocation pool: {0}")]
    Pool(#[from] PoolError),
    #[error("could not build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Long-lived components shared by every auction request.
pub struct Gateway {
    pub dispatcher: Dispatcher,
    pub geolocation: Option<Arc<GeoLocationClient>>,
    refresh_task: Option<JoinHandle<()>>,
}

impl Gateway {
    /// Builds every component described by `config`.
    ///
    /// Must run inside a tokio runtime: it resolves the geolocation addresses
    /// and starts the pool's periodic refresh.
    pub async fn build(config: &Config) -> Result<Self, GatewayError> {
        let hyper_transport: Arc<dyn HttpTransport> =
            Arc::new(HyperTransport::new(&config.bidder_http));

        let transport = match &config.bidder_http.circuit_breaker {
            Some(breaker_config) => {
                tracing::info!("Partner calls guarded by host circuit breakers");
                Arc::new(BreakerTransport::new(hyper_transport, breaker_config.clone()))
                    as Arc<dyn HttpTransport>
            }
            None => hyper_transport,
        };
        let dispatcher = Dispatcher::new(transport);

        let (geolocation, refresh_task) = match &config.geolocation {
            Some(geo_config) => {
                let pool = Arc::new(
                    LiveAddressPool::resolve("geolocation", &geo_config.pool.addresses).await?,
                );
                let refresh_task = pool.spawn_refresh(geo_config.pool.refresh_interval());

                let http = reqwest::Client::builder().build()?;
                let client = GeoLocationClient::new(
                    http,
                    pool,
                    geo_config.circuit_breaker.clone(),
                    geo_config.path.clone(),
                    geo_config.timeout(),
                );
                (Some(Arc::new(client)), Some(refresh_task))
            }
            None => (None, None),
        };

        Ok(Self {
            dispatcher,
            geolocation,
            refresh_task,
        })
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Installs the global tracing subscriber, with Sentry reporting when a DSN
/// is configured. The returned guard must live as long as the process.
pub fn init_logging(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

/// Installs the statsd recorder and describes every known metric.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), GatewayError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| GatewayError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| GatewayError::Metrics(e.to_string()))?;

    describe_metrics();
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Metrics reporting to statsd"
    );
    Ok(())
}

fn describe_metrics() {
    shared::metrics_defs::describe_all(bidder_dispatch::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(circuit_breaker::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(upstream::metrics_defs::ALL_METRICS);
}
