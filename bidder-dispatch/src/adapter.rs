use crate::types::{AuctionRequest, Bid, BidderError, CallPayload, HttpResponse, OutboundCall};

/// Calls built for one auction request, plus any problems found while building them.
pub struct BuildResult<P> {
    pub calls: Vec<OutboundCall<P>>,
    pub errors: Vec<BidderError>,
}

impl<P> BuildResult<P> {
    pub fn new(calls: Vec<OutboundCall<P>>, errors: Vec<BidderError>) -> Self {
        Self { calls, errors }
    }
}

impl<P> Default for BuildResult<P> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Bids and parse-level errors extracted from one response.
#[derive(Debug, Default)]
pub struct ParseResult {
    pub bids: Vec<Bid>,
    pub errors: Vec<BidderError>,
}

impl ParseResult {
    pub fn new(bids: Vec<Bid>, errors: Vec<BidderError>) -> Self {
        Self { bids, errors }
    }
}

/// Partner-specific request building and response parsing
///
/// The adapter implements everything the dispatcher does not know about a partner:
/// - How to turn an auction request into zero or more outbound calls
/// - How to read bids out of a processable (HTTP 200) response
///
/// Both methods must be free of side effects; the dispatcher may call them
/// concurrently for different auction requests.
pub trait PartnerAdapter: Send + Sync {
    type Payload: CallPayload;

    fn name(&self) -> &str;

    fn build_calls(&self, request: &AuctionRequest) -> BuildResult<Self::Payload>;

    fn parse_response(
        &self,
        call: &OutboundCall<Self::Payload>,
        response: &HttpResponse,
    ) -> ParseResult;
}
