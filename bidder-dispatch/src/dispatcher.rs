//! Concurrent execution of one partner's outbound calls.

use crate::adapter::{BuildResult, PartnerAdapter};
use crate::budget::Deadline;
use crate::correlator::{CallReport, correlate};
use crate::errors::DispatchError;
use crate::metrics_defs::{BIDDER_CALL_ERRORS, BIDDER_CALL_SKIPPED, BIDDER_REQUEST_DURATION};
use crate::transport::{HttpTransport, TransportRequest};
use crate::types::{
    AuctionRequest, BidderError, CallOutcome, CallPayload, HttpCallTrace, OutboundCall,
    SeatBidResult, TransportErrorKind,
};
use http::StatusCode;
use shared::{counter, histogram};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

const NO_CALLS_MESSAGE: &str =
    "The bidder failed to generate any bid requests, but also failed to generate an error";

/// Result of one spawned call task.
struct CallTaskResult {
    /// Position of the call in the adapter's output
    index: usize,
    outcome: CallOutcome,
    /// False when the budget was spent before the call could be issued
    attempted: bool,
}

/// Fans one partner's calls out over a shared transport.
///
/// Holds no per-request state: a single dispatcher serves every partner and
/// every auction concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Runs every call `adapter` builds for `request` and gathers the bids.
    ///
    /// Waits for all calls to settle before returning. Partner failures end up
    /// as correlated errors in the result; `Err` is only returned when a call
    /// task itself died.
    pub async fn dispatch<A>(
        &self,
        adapter: &A,
        request: &AuctionRequest,
        deadline: Deadline,
        debug: bool,
    ) -> Result<SeatBidResult, DispatchError>
    where
        A: PartnerAdapter + ?Sized,
    {
        let started = Instant::now();
        let partner = adapter.name();

        let BuildResult {
            calls,
            errors: build_errors,
        } = adapter.build_calls(request);

        if calls.is_empty() {
            let mut errors = build_errors;
            if errors.is_empty() {
                tracing::warn!(partner, "Adapter built neither calls nor errors");
                errors.push(BidderError::generic(NO_CALLS_MESSAGE));
            }
            histogram!(BIDDER_REQUEST_DURATION, "partner" => partner.to_string())
                .record(started.elapsed().as_secs_f64());
            return Ok(SeatBidResult {
                errors,
                ..Default::default()
            });
        }

        let outcomes = self.execute_all(&calls, deadline).await?;

        let mut bids = Vec::new();
        let mut parse_errors = Vec::new();
        let mut reports = Vec::with_capacity(calls.len());
        let mut traces = Vec::new();

        for (call, (outcome, attempted)) in calls.iter().zip(outcomes) {
            if !attempted {
                counter!(BIDDER_CALL_SKIPPED, "partner" => partner.to_string()).increment(1);
            } else if debug {
                traces.push(HttpCallTrace::new(call, &outcome));
            }

            let error = match &outcome {
                CallOutcome::Success(response) if response.status == StatusCode::OK => {
                    let parsed = adapter.parse_response(call, response);
                    bids.extend(parsed.bids);
                    parse_errors.extend(parsed.errors);
                    None
                }
                CallOutcome::Success(response) if response.status == StatusCode::NO_CONTENT => None,
                _ => Some(call_error(&outcome)),
            };

            if let Some(error) = &error {
                tracing::debug!(partner, uri = %call.uri, error = %error.message, "Partner call failed");
                counter!(BIDDER_CALL_ERRORS, "partner" => partner.to_string(), "kind" => error.kind.as_str())
                    .increment(1);
            }

            reports.push(CallReport {
                impression_ids: call.payload.impression_ids(),
                error,
            });
        }

        let errors = correlate(
            &request.impression_ids(),
            build_errors,
            &reports,
            &bids,
            parse_errors,
        );

        histogram!(BIDDER_REQUEST_DURATION, "partner" => partner.to_string())
            .record(started.elapsed().as_secs_f64());

        Ok(SeatBidResult {
            bids,
            debug_trace: debug.then_some(traces),
            errors,
        })
    }

    /// Spawns one task per call and waits for all of them.
    ///
    /// Returns `(outcome, attempted)` per call, in call order.
    async fn execute_all<P: CallPayload>(
        &self,
        calls: &[OutboundCall<P>],
        deadline: Deadline,
    ) -> Result<Vec<(CallOutcome, bool)>, DispatchError> {
        let mut join_set = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            let transport = self.transport.clone();
            let request = TransportRequest::from(call);

            join_set.spawn(async move {
                let remaining = deadline.remaining();
                if remaining.is_zero() {
                    return CallTaskResult {
                        index,
                        outcome: CallOutcome::Timeout,
                        attempted: false,
                    };
                }

                let outcome = timeout_at(deadline.instant(), transport.execute(request, remaining))
                    .await
                    .unwrap_or(CallOutcome::Timeout);

                CallTaskResult {
                    index,
                    outcome,
                    attempted: true,
                }
            });
        }

        let mut results: Vec<Option<(CallOutcome, bool)>> = (0..calls.len()).map(|_| None).collect();

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(task) => {
                    results[task.index] = Some((task.outcome, task.attempted));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Partner call task failed");
                    return Err(DispatchError::TaskFailed(e.to_string()));
                }
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| result.ok_or(DispatchError::MissingResult(index)))
            .collect()
    }
}

/// Error for a call that produced nothing processable.
fn call_error(outcome: &CallOutcome) -> BidderError {
    match outcome {
        CallOutcome::Success(response) => {
            let message = format!(
                "Unexpected status code: {}. Run with request.debug = 1 for more info",
                response.status.as_u16()
            );
            if response.status == StatusCode::BAD_REQUEST {
                BidderError::bad_input(message)
            } else {
                BidderError::bad_server_response(message)
            }
        }
        CallOutcome::Timeout => BidderError::timeout("Timed out"),
        CallOutcome::TransportFailure(e) if e.kind == TransportErrorKind::ConnectTimeout => {
            BidderError::timeout(e.message.clone())
        }
        CallOutcome::TransportFailure(e) => BidderError::generic(e.message.clone()),
    }
}
