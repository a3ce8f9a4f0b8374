use shared::metrics_defs::{MetricDef, MetricType};

pub const BIDDER_REQUEST_DURATION: MetricDef = MetricDef {
    name: "bidder.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to dispatch one partner in seconds. Tagged with partner.",
};

pub const BIDDER_CALL_ERRORS: MetricDef = MetricDef {
    name: "bidder.call.errors",
    metric_type: MetricType::Counter,
    description: "Outbound calls that ended in an error. Tagged with partner, kind.",
};

pub const BIDDER_CALL_SKIPPED: MetricDef = MetricDef {
    name: "bidder.call.skipped",
    metric_type: MetricType::Counter,
    description: "Outbound calls never issued because the auction budget was spent.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BIDDER_REQUEST_DURATION,
    BIDDER_CALL_ERRORS,
    BIDDER_CALL_SKIPPED,
];
