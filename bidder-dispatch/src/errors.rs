use thiserror::Error;

/// Faults that abort a dispatch outright.
///
/// Partner failures are never reported here; they are folded into the
/// `SeatBidResult` as `BidderError`s.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("call task failed: {0}")]
    TaskFailed(String),

    #[error("call result missing for call {0}")]
    MissingResult(usize),
}
