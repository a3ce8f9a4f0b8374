use crate::adapter::{BuildResult, ParseResult, PartnerAdapter};
use crate::transport::{HttpTransport, TransportRequest};
use crate::types::{
    AuctionRequest, Bid, BidderError, CallOutcome, CallPayload, HttpResponse, Imp, ImpId,
    OutboundCall, TransportError, TransportErrorKind,
};
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use hyper::body::Bytes;
use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Builds an auction request with the given impression ids.
pub fn auction(imp_ids: &[&str]) -> AuctionRequest {
    AuctionRequest {
        id: "auction-1".to_string(),
        imp: imp_ids
            .iter()
            .map(|id| Imp {
                id: id.to_string(),
                extra_fields: HashMap::new(),
            })
            .collect(),
        extra_fields: HashMap::new(),
    }
}

#[derive(Debug, Clone)]
enum ReplyKind {
    Status(StatusCode, &'static str),
    Failure(TransportErrorKind, &'static str),
}

/// Scripted answer of the mock transport for one URI.
#[derive(Debug, Clone)]
pub struct Reply {
    kind: ReplyKind,
    delay: Duration,
    /// Keep going past the timeout the transport was handed
    ignores_timeout: bool,
}

impl Reply {
    pub fn status(status: StatusCode, body: &'static str) -> Self {
        Self {
            kind: ReplyKind::Status(status, body),
            delay: Duration::ZERO,
            ignores_timeout: false,
        }
    }

    pub fn failure(message: &'static str) -> Self {
        Self {
            kind: ReplyKind::Failure(TransportErrorKind::Other, message),
            delay: Duration::ZERO,
            ignores_timeout: false,
        }
    }

    pub fn connect_timeout() -> Self {
        Self {
            kind: ReplyKind::Failure(TransportErrorKind::ConnectTimeout, "connect timed out"),
            delay: Duration::ZERO,
            ignores_timeout: false,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ignoring_timeout(mut self) -> Self {
        self.ignores_timeout = true;
        self
    }

    fn outcome(&self) -> CallOutcome {
        match &self.kind {
            ReplyKind::Status(status, body) => CallOutcome::Success(HttpResponse {
                status: *status,
                headers: HeaderMap::new(),
                body: Bytes::from_static(body.as_bytes()),
            }),
            ReplyKind::Failure(kind, message) => {
                CallOutcome::TransportFailure(TransportError::new(*kind, *message))
            }
        }
    }
}

/// Transport answering from a script keyed by full URI.
///
/// Honors the timeout it is given the way a real transport would, unless the
/// reply ignores it. Records every call it receives.
#[derive(Default)]
pub struct MockTransport {
    replies: HashMap<String, Reply>,
    received: Mutex<Vec<(String, Duration)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, uri: &str, reply: Reply) -> Self {
        self.replies.insert(uri.to_string(), reply);
        self
    }

    /// Number of calls received for `uri`.
    pub fn calls(&self, uri: &str) -> usize {
        self.timeouts(uri).len()
    }

    /// Timeouts passed along with each call for `uri`.
    pub fn timeouts(&self, uri: &str) -> Vec<Duration> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(received, _)| received == uri)
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: TransportRequest, timeout: Duration) -> CallOutcome {
        let uri = request.uri.to_string();
        self.received.lock().unwrap().push((uri.clone(), timeout));

        let Some(reply) = self.replies.get(&uri) else {
            return CallOutcome::TransportFailure(TransportError::new(
                TransportErrorKind::Other,
                format!("no reply scripted for {uri}"),
            ));
        };

        if reply.delay > timeout && !reply.ignores_timeout {
            tokio::time::sleep(timeout).await;
            return CallOutcome::Timeout;
        }
        tokio::time::sleep(reply.delay).await;
        reply.outcome()
    }
}

#[derive(Debug, Clone)]
pub struct TestPayload {
    pub imp_ids: Vec<ImpId>,
}

impl CallPayload for TestPayload {
    fn impression_ids(&self) -> Vec<ImpId> {
        self.imp_ids.clone()
    }
}

#[derive(Deserialize)]
struct TestResponse {
    #[serde(default)]
    bids: Vec<Bid>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Adapter issuing a fixed list of calls.
///
/// Responses are read as `{"bids": [...], "errors": [...]}`.
#[derive(Default)]
pub struct TestAdapter {
    calls: Vec<(String, Vec<ImpId>)>,
    build_errors: Vec<BidderError>,
}

impl TestAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call(mut self, uri: &str, imp_ids: &[&str]) -> Self {
        self.calls.push((
            uri.to_string(),
            imp_ids.iter().map(|id| id.to_string()).collect(),
        ));
        self
    }

    pub fn build_error(mut self, error: BidderError) -> Self {
        self.build_errors.push(error);
        self
    }
}

impl PartnerAdapter for TestAdapter {
    type Payload = TestPayload;

    fn name(&self) -> &str {
        "test-partner"
    }

    fn build_calls(&self, request: &AuctionRequest) -> BuildResult<TestPayload> {
        let calls = self
            .calls
            .iter()
            .map(|(uri, imp_ids)| {
                let body = serde_json::json!({"id": request.id, "imp": imp_ids});
                OutboundCall {
                    method: Method::POST,
                    uri: uri.parse().unwrap(),
                    headers: HeaderMap::new(),
                    body: Bytes::from(body.to_string()),
                    payload: TestPayload {
                        imp_ids: imp_ids.clone(),
                    },
                }
            })
            .collect();

        BuildResult::new(calls, self.build_errors.clone())
    }

    fn parse_response(
        &self,
        _call: &OutboundCall<TestPayload>,
        response: &HttpResponse,
    ) -> ParseResult {
        match serde_json::from_slice::<TestResponse>(&response.body) {
            Ok(parsed) => ParseResult::new(
                parsed.bids,
                parsed
                    .errors
                    .into_iter()
                    .map(BidderError::bad_server_response)
                    .collect(),
            ),
            Err(e) => ParseResult::new(
                Vec::new(),
                vec![BidderError::bad_server_response(format!(
                    "Bad response body: {e}"
                ))],
            ),
        }
    }
}

/// Recorder keeping the name of every histogram sample.
#[derive(Default)]
pub struct HistogramRecorder {
    samples: Arc<Mutex<Vec<String>>>,
}

impl HistogramRecorder {
    pub fn recorded(&self) -> Vec<String> {
        self.samples.lock().unwrap().clone()
    }
}

struct NamedHistogram {
    name: String,
    samples: Arc<Mutex<Vec<String>>>,
}

impl HistogramFn for NamedHistogram {
    fn record(&self, _value: f64) {
        self.samples.lock().unwrap().push(self.name.clone());
    }
}

impl Recorder for HistogramRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, _key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(NamedHistogram {
            name: key.name().to_string(),
            samples: self.samples.clone(),
        }))
    }
}
