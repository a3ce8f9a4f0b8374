use crate::transport::{HttpTransport, TransportRequest};
use crate::types::{CallOutcome, TransportError, TransportErrorKind};
use async_trait::async_trait;
use circuit_breaker::{BreakerConfig, BreakerError, BreakerRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a transport with one circuit breaker per partner host.
///
/// Breakers are keyed by the URI authority of each call. Transport failures
/// and timeouts count against the host; any HTTP response, whatever its
/// status, counts as the host being up.
pub struct BreakerTransport {
    inner: Arc<dyn HttpTransport>,
    breakers: BreakerRegistry<String>,
}

impl BreakerTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, config: BreakerConfig) -> Self {
        Self {
            inner,
            breakers: BreakerRegistry::new(config),
        }
    }

    pub fn breakers(&self) -> &BreakerRegistry<String> {
        &self.breakers
    }
}

fn breaker_key(request: &TransportRequest) -> String {
    request
        .uri
        .authority()
        .map(|authority| authority.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl HttpTransport for BreakerTransport {
    async fn execute(&self, request: TransportRequest, timeout: Duration) -> CallOutcome {
        let breaker = self.breakers.get(&breaker_key(&request));

        let result = breaker
            .execute(|| async {
                match self.inner.execute(request, timeout).await {
                    CallOutcome::Success(response) => Ok(response),
                    failed => Err(failed),
                }
            })
            .await;

        match result {
            Ok(response) => CallOutcome::Success(response),
            Err(BreakerError::Inner(failed)) => failed,
            Err(BreakerError::Open) => CallOutcome::TransportFailure(TransportError::new(
                TransportErrorKind::CircuitOpen,
                BreakerError::<TransportError>::Open.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockTransport, Reply};
    use circuit_breaker::BreakerState;
    use http::{HeaderMap, Method, StatusCode};
    use hyper::body::Bytes;

    fn request(uri: &str) -> TransportRequest {
        TransportRequest {
            method: Method::POST,
            uri: uri.parse().unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn config() -> BreakerConfig {
        BreakerConfig {
            opening_threshold: 1,
            opening_window_ms: 1000,
            closing_delay_ms: 60_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_short_circuits_host() {
        let mock = Arc::new(
            MockTransport::new()
                .reply("http://down.example/bid", Reply::failure("connection refused"))
                .reply("http://up.example/bid", Reply::status(StatusCode::OK, "{}")),
        );
        let transport = BreakerTransport::new(mock.clone(), config());
        let timeout = Duration::from_secs(1);

        let outcome = transport.execute(request("http://down.example/bid"), timeout).await;
        match outcome {
            CallOutcome::TransportFailure(e) => assert_eq!(e.message, "connection refused"),
            other => panic!("expected transport failure, got {other:?}"),
        }

        let outcome = transport.execute(request("http://down.example/bid"), timeout).await;
        match outcome {
            CallOutcome::TransportFailure(e) => {
                assert_eq!(e.kind, TransportErrorKind::CircuitOpen);
                assert_eq!(e.message, "open circuit");
            }
            other => panic!("expected open circuit, got {other:?}"),
        }
        assert_eq!(mock.calls("http://down.example/bid"), 1);

        // Other hosts are unaffected
        let outcome = transport.execute(request("http://up.example/bid"), timeout).await;
        assert!(outcome.is_success());
        assert_eq!(
            transport.breakers().get(&"up.example".to_string()).state(),
            BreakerState::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_keeps_breaker_closed() {
        let mock = Arc::new(
            MockTransport::new().reply("http://partner.example/bid", Reply::status(StatusCode::BAD_GATEWAY, "")),
        );
        let transport = BreakerTransport::new(mock.clone(), config());

        for _ in 0..3 {
            let outcome = transport
                .execute(request("http://partner.example/bid"), Duration::from_secs(1))
                .await;
            assert_eq!(outcome.response().unwrap().status, StatusCode::BAD_GATEWAY);
        }
        assert_eq!(mock.calls("http://partner.example/bid"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let mock = Arc::new(MockTransport::new().reply(
            "http://slow.example/bid",
            Reply::status(StatusCode::OK, "{}").after(Duration::from_secs(5)),
        ));
        let transport = BreakerTransport::new(mock, config());

        let outcome = transport
            .execute(request("http://slow.example/bid"), Duration::from_millis(100))
            .await;
        assert!(matches!(outcome, CallOutcome::Timeout));
        assert_eq!(
            transport.breakers().get(&"slow.example".to_string()).state(),
            BreakerState::Open
        );
    }
}
