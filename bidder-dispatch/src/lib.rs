//! Fan-out of auction requests to bidding partners.
//!
//! For one partner and one auction request, the [`Dispatcher`] asks the
//! partner's [`PartnerAdapter`] for outbound calls, runs them concurrently
//! against the shared auction [`Deadline`], hands processable responses back
//! to the adapter, and folds every failure into [`BidderError`]s attributed
//! to the impressions they affect (see [`correlator`]).

pub mod adapter;
pub mod breaker_transport;
pub mod budget;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod errors;
pub mod metrics_defs;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testutils;

pub use adapter::{BuildResult, ParseResult, PartnerAdapter};
pub use breaker_transport::BreakerTransport;
pub use budget::Deadline;
pub use config::HttpClientConfig;
pub use dispatcher::Dispatcher;
pub use errors::DispatchError;
pub use transport::{HttpTransport, HyperTransport, TransportRequest};
pub use types::{
    AuctionRequest, Bid, BidderError, BidderErrorKind, CallOutcome, CallPayload, HttpCallTrace,
    HttpResponse, Imp, ImpId, OutboundCall, SeatBidResult, TransportError, TransportErrorKind,
};
