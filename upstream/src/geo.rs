//! Breaker-guarded client for the geolocation lookup service.
//!
//! Every lookup picks a live instance from the pool and runs the request
//! through that instance's circuit breaker. The pool is registered as an
//! observer of the breakers, so an instance that keeps failing leaves the
//! rotation until its breaker is ready to probe it again.

use crate::metrics_defs::GEO_LOOKUP_DURATION;
use crate::pool::{Address, LiveAddressPool};
use circuit_breaker::{BreakerConfig, BreakerError, BreakerRegistry};
use reqwest::StatusCode;
use serde::Deserialize;
use shared::histogram;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

#[derive(Error, Debug)]
pub enum GeoLocationError {
    #[error("no geolocation address available")]
    NoAddressAvailable,

    #[error("open circuit for {0}")]
    CircuitOpen(Address),

    #[error("geolocation lookup timed out")]
    Timeout,

    #[error("geolocation request failed: {0}")]
    Request(String),

    #[error("geolocation service responded with status {0}")]
    BadStatus(u16),

    #[error("could not decode geolocation response: {0}")]
    Decode(String),

    #[error("invalid geolocation url: {0}")]
    InvalidUrl(String),
}

/// Location of an IP address as reported by the lookup service
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

pub struct GeoLocationClient {
    http: reqwest::Client,
    pool: Arc<LiveAddressPool>,
    breakers: BreakerRegistry<Address>,
    path: String,
    timeout: Duration,
}

impl GeoLocationClient {
    pub fn new(
        http: reqwest::Client,
        pool: Arc<LiveAddressPool>,
        breaker_config: BreakerConfig,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let breakers = BreakerRegistry::<Address>::new(breaker_config).with_observer(pool.clone());

        Self {
            http,
            pool,
            breakers,
            path: path.into(),
            timeout,
        }
    }

    pub fn pool(&self) -> &Arc<LiveAddressPool> {
        &self.pool
    }

    pub fn breakers(&self) -> &BreakerRegistry<Address> {
        &self.breakers
    }

    /// Looks up `ip` on one live instance.
    ///
    /// The request timeout is the configured lookup timeout, capped by
    /// `budget` when the caller has less time left than that.
    pub async fn lookup(
        &self,
        ip: &str,
        budget: Option<Duration>,
    ) -> Result<GeoInfo, GeoLocationError> {
        let timeout = budget.map_or(self.timeout, |budget| budget.min(self.timeout));
        if timeout.is_zero() {
            return Err(GeoLocationError::Timeout);
        }

        let address = self
            .pool
            .get_address()
            .map_err(|_| GeoLocationError::NoAddressAvailable)?;
        let url = self.lookup_url(&address, ip)?;
        let breaker = self.breakers.get(&address);

        let started = Instant::now();
        let result = breaker
            .execute(|| self.fetch(url, timeout))
            .await
            .map_err(|e| match e {
                BreakerError::Open => GeoLocationError::CircuitOpen(address.clone()),
                BreakerError::Inner(e) => e,
            });

        let status = if result.is_ok() { "ok" } else { "error" };
        histogram!(GEO_LOOKUP_DURATION, "status" => status).record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            tracing::debug!(address = %address, error = %e, "Geolocation lookup failed");
        }
        result
    }

    fn lookup_url(&self, address: &str, ip: &str) -> Result<Url, GeoLocationError> {
        let mut url = Url::parse(&format!("http://{address}"))
            .map_err(|e| GeoLocationError::InvalidUrl(e.to_string()))?;
        url.set_path(&self.path);
        url.query_pairs_mut().append_pair("ip", ip);
        Ok(url)
    }

    async fn fetch(&self, url: Url, timeout: Duration) -> Result<GeoInfo, GeoLocationError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_request_error)?;

        if response.status() != StatusCode::OK {
            return Err(GeoLocationError::BadStatus(response.status().as_u16()));
        }

        response
            .json::<GeoInfo>()
            .await
            .map_err(|e| match classify_request_error(e) {
                GeoLocationError::Request(message) => GeoLocationError::Decode(message),
                other => other,
            })
    }
}

fn classify_request_error(error: reqwest::Error) -> GeoLocationError {
    if error.is_timeout() {
        GeoLocationError::Timeout
    } else {
        GeoLocationError::Request(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use std::convert::Infallible;
    use tokio::net::TcpListener;

    /// Start a mock geolocation server answering every request the same way
    async fn start_mock_server(status: u16, body: &'static str, delay: Duration) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);

                tokio::spawn(async move {
                    let service = service_fn(move |_req: Request<hyper::body::Incoming>| async move {
                        tokio::time::sleep(delay).await;
                        let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
                        *response.status_mut() = hyper::StatusCode::from_u16(status).unwrap();
                        Ok::<_, Infallible>(response)
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        port
    }

    async fn test_client(addresses: Vec<String>, threshold: u32) -> GeoLocationClient {
        let pool = Arc::new(LiveAddressPool::resolve("geo", &addresses).await.unwrap());
        GeoLocationClient::new(
            reqwest::Client::new(),
            pool,
            BreakerConfig {
                opening_threshold: threshold,
                opening_window_ms: 10_000,
                closing_delay_ms: 60_000,
            },
            "/geo",
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let port = start_mock_server(
            200,
            r#"{"country": "DE", "city": "Berlin", "lat": 52.52, "lon": 13.40}"#,
            Duration::ZERO,
        )
        .await;
        let client = test_client(vec![format!("127.0.0.1:{port}")], 1).await;

        let info = client.lookup("203.0.113.7", None).await.unwrap();
        assert_eq!(info.country.as_deref(), Some("DE"));
        assert_eq!(info.city.as_deref(), Some("Berlin"));
        assert_eq!(info.region, None);
    }

    #[tokio::test]
    async fn test_failing_instance_leaves_rotation() {
        // Nothing listens on port 1
        let client = test_client(vec!["127.0.0.1:1".to_string()], 1).await;

        let err = client.lookup("203.0.113.7", None).await.unwrap_err();
        assert!(matches!(err, GeoLocationError::Request(_)));

        // The breaker opened and the only instance left the pool
        assert!(client.pool().live_addresses().is_empty());
        assert!(matches!(
            client.lookup("203.0.113.7", None).await.unwrap_err(),
            GeoLocationError::NoAddressAvailable
        ));

        client.pool().refresh();
        assert!(matches!(
            client.lookup("203.0.113.7", None).await.unwrap_err(),
            GeoLocationError::CircuitOpen(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_timeout_and_budget() {
        let port = start_mock_server(200, "{}", Duration::from_millis(500)).await;
        let client = test_client(vec![format!("127.0.0.1:{port}")], 5).await;

        assert!(matches!(
            client.lookup("203.0.113.7", None).await.unwrap_err(),
            GeoLocationError::Timeout
        ));
        assert!(matches!(
            client.lookup("203.0.113.7", Some(Duration::ZERO)).await.unwrap_err(),
            GeoLocationError::Timeout
        ));
    }

    #[tokio::test]
    async fn test_bad_status_and_body() {
        let port = start_mock_server(503, "", Duration::ZERO).await;
        let client = test_client(vec![format!("127.0.0.1:{port}")], 5).await;
        assert!(matches!(
            client.lookup("203.0.113.7", None).await.unwrap_err(),
            GeoLocationError::BadStatus(503)
        ));

        let port = start_mock_server(200, "not json", Duration::ZERO).await;
        let client = test_client(vec![format!("127.0.0.1:{port}")], 5).await;
        assert!(matches!(
            client.lookup("203.0.113.7", None).await.unwrap_err(),
            GeoLocationError::Decode(_)
        ));
    }
}
