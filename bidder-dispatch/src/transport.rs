use crate::config::HttpClientConfig;
use crate::types::{CallOutcome, HttpResponse, OutboundCall, TransportError, TransportErrorKind};
use async_trait::async_trait;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::error::Error as StdError;
use std::time::Duration;
use tokio::time::timeout;

/// The HTTP part of an outbound call, detached from its partner payload.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl<P> From<&OutboundCall<P>> for TransportRequest {
    fn from(call: &OutboundCall<P>) -> Self {
        Self {
            method: call.method.clone(),
            uri: call.uri.clone(),
            headers: call.headers.clone(),
            body: call.body.clone(),
        }
    }
}

/// Executes one HTTP exchange.
///
/// Implementations never fail: every problem is reported through the returned
/// [`CallOutcome`]. `timeout` bounds the whole exchange, including reading
/// the response body.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest, timeout: Duration) -> CallOutcome;
}

/// Partner transport on top of hyper's pooled client. Speaks both `http`
/// and `https`; certificates are checked against the webpki roots.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new(config: &HttpClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(config.connect_timeout());
        connector.set_nodelay(true);
        connector.enforce_http(false);

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(connector);

        let client = Client::builder(TokioExecutor::new()).build(https);
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for HyperTransport {
    async fn execute(&self, request: TransportRequest, timeout_duration: Duration) -> CallOutcome {
        let mut req_builder = Request::builder().method(request.method).uri(request.uri);

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        let upstream_request = match req_builder.body(Full::new(request.body)) {
            Ok(upstream_request) => upstream_request,
            Err(e) => {
                return CallOutcome::TransportFailure(TransportError::new(
                    TransportErrorKind::Other,
                    format!("Failed to build request: {e}"),
                ));
            }
        };

        let exchange = async {
            let response = self.client.request(upstream_request).await.map_err(|e| {
                let kind = if e.is_connect() && caused_by_timeout(&e) {
                    TransportErrorKind::ConnectTimeout
                } else {
                    TransportErrorKind::Other
                };
                TransportError::new(kind, describe(&e))
            })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Other,
                        format!("Failed to read response body: {e}"),
                    )
                })?;

            Ok::<_, TransportError>(HttpResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match timeout(timeout_duration, exchange).await {
            Ok(Ok(response)) => CallOutcome::Success(response),
            Ok(Err(e)) => CallOutcome::TransportFailure(e),
            Err(_) => CallOutcome::Timeout,
        }
    }
}

/// Whether a timed-out I/O error sits anywhere in the error's source chain.
fn caused_by_timeout(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Error message including its causes; hyper's top-level messages are terse.
fn describe(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();
    while let Some(e) = current {
        message.push_str(": ");
        message.push_str(&e.to_string());
        current = e.source();
    }
    message
}
