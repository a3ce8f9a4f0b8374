//! Data exchanged between the dispatcher, partner adapters and transports.

use http::{HeaderMap, Method, StatusCode, Uri};
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Identifier of one ad slot within an auction request
pub type ImpId = String;

/// One ad slot of an auction request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Imp {
    pub id: ImpId,

    /// Everything else about the slot, passed through to adapters untouched.
    #[serde(flatten)]
    pub extra_fields: HashMap<String, JsonValue>,
}

/// Incoming auction request, opaque to the dispatcher apart from its impressions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuctionRequest {
    pub id: String,
    pub imp: Vec<Imp>,

    #[serde(flatten)]
    pub extra_fields: HashMap<String, JsonValue>,
}

impl AuctionRequest {
    pub fn impression_ids(&self) -> BTreeSet<ImpId> {
        self.imp.iter().map(|imp| imp.id.clone()).collect()
    }
}

/// Partner-defined handle attached to an outbound call.
pub trait CallPayload: Send + Sync + 'static {
    /// Impressions carried by the call.
    fn impression_ids(&self) -> Vec<ImpId>;
}

/// One HTTP request destined for a partner.
#[derive(Debug, Clone)]
pub struct OutboundCall<P> {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub payload: P,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established in time
    ConnectTimeout,
    /// The call was vetoed by an open circuit breaker
    CircuitOpen,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of executing one outbound call.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Success(HttpResponse),
    TransportFailure(TransportError),
    Timeout,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            CallOutcome::Success(response) => Some(response),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidderErrorKind {
    Timeout,
    BadInput,
    BadServerResponse,
    Generic,
}

impl BidderErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BidderErrorKind::Timeout => "timeout",
            BidderErrorKind::BadInput => "bad_input",
            BidderErrorKind::BadServerResponse => "bad_server_response",
            BidderErrorKind::Generic => "generic",
        }
    }
}

/// A partner-level failure, attributed to impressions once correlated.
///
/// `impression_ids: None` means the error applies to no specific impression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidderError {
    pub message: String,
    pub kind: BidderErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impression_ids: Option<BTreeSet<ImpId>>,
}

impl BidderError {
    pub fn new(kind: BidderErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            impression_ids: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(BidderErrorKind::Timeout, message)
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(BidderErrorKind::BadInput, message)
    }

    pub fn bad_server_response(message: impl Into<String>) -> Self {
        Self::new(BidderErrorKind::BadServerResponse, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(BidderErrorKind::Generic, message)
    }

    /// Attributes the error to `ids`, or to nothing in particular when `ids` is empty.
    pub fn tagged(mut self, ids: &BTreeSet<ImpId>) -> Self {
        self.impression_ids = if ids.is_empty() {
            None
        } else {
            Some(ids.clone())
        };
        self
    }
}

/// A bid returned by a partner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bid {
    pub id: String,
    #[serde(rename = "impid")]
    pub imp_id: ImpId,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(default, rename = "dealid", skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,

    #[serde(flatten)]
    pub extra_fields: HashMap<String, JsonValue>,
}

/// Debug record of one attempted call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpCallTrace {
    pub uri: String,
    pub request_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

impl HttpCallTrace {
    pub fn new<P>(call: &OutboundCall<P>, outcome: &CallOutcome) -> Self {
        let response = outcome.response();
        Self {
            uri: call.uri.to_string(),
            request_body: String::from_utf8_lossy(&call.body).into_owned(),
            status: response.map(|r| r.status.as_u16()),
            response_body: response.map(|r| String::from_utf8_lossy(&r.body).into_owned()),
        }
    }
}

/// Everything one partner produced for one auction request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeatBidResult {
    pub bids: Vec<Bid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_trace: Option<Vec<HttpCallTrace>>,
    pub errors: Vec<BidderError>,
}
