//! Attribution of partner errors to the impressions they affect.
//!
//! Errors come in three categories, always emitted in this order:
//! 1. Build errors reported by the adapter, tagged with the requested
//!    impressions that no call carries.
//! 2. Call failures (transport errors, timeouts, unprocessable statuses),
//!    tagged with the impressions of every failed call.
//! 3. Parse errors, tagged with the impressions that were sent on a call
//!    that did not fail but got no bid back.
//!
//! Within a category, errors keep the order in which they were found. Every
//! tag is a subset of the requested impressions; an empty tag leaves the
//! error unattributed.

use crate::types::{Bid, BidderError, ImpId};
use std::collections::BTreeSet;

/// What correlation needs to know about one built call.
#[derive(Debug, Clone)]
pub struct CallReport {
    pub impression_ids: Vec<ImpId>,
    /// Call-level error, if the call did not yield a processable response
    pub error: Option<BidderError>,
}

impl CallReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

pub fn correlate(
    requested: &BTreeSet<ImpId>,
    build_errors: Vec<BidderError>,
    calls: &[CallReport],
    bids: &[Bid],
    parse_errors: Vec<BidderError>,
) -> Vec<BidderError> {
    let sent = collect_ids(calls.iter());
    let failed = collect_ids(calls.iter().filter(|call| call.failed()));
    let responded: BTreeSet<&ImpId> = bids.iter().map(|bid| &bid.imp_id).collect();

    let unsent = restrict(requested, |id| !sent.contains(id));
    let failed_tag = restrict(requested, |id| failed.contains(id));
    let silent = restrict(requested, |id| {
        sent.contains(id) && !failed.contains(id) && !responded.contains(id)
    });

    let mut errors = Vec::with_capacity(
        build_errors.len() + calls.iter().filter(|c| c.failed()).count() + parse_errors.len(),
    );
    errors.extend(build_errors.into_iter().map(|e| e.tagged(&unsent)));
    errors.extend(
        calls
            .iter()
            .filter_map(|call| call.error.clone())
            .map(|e| e.tagged(&failed_tag)),
    );
    errors.extend(parse_errors.into_iter().map(|e| e.tagged(&silent)));
    errors
}

fn collect_ids<'a>(calls: impl Iterator<Item = &'a CallReport>) -> BTreeSet<&'a ImpId> {
    calls.flat_map(|call| call.impression_ids.iter()).collect()
}

/// Requested ids satisfying `keep`.
fn restrict(requested: &BTreeSet<ImpId>, keep: impl Fn(&ImpId) -> bool) -> BTreeSet<ImpId> {
    requested.iter().filter(|id| keep(id)).cloned().collect()
}
