//! Metrics definitions for circuit breakers.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BREAKER_OPENED: MetricDef = MetricDef {
    name: "circuit_breaker.opened",
    metric_type: MetricType::Counter,
    description: "Number of transitions into the open state. Tagged with key.",
};

pub const BREAKER_HALF_OPENED: MetricDef = MetricDef {
    name: "circuit_breaker.half_opened",
    metric_type: MetricType::Counter,
    description: "Number of transitions into the half-open state. Tagged with key.",
};

pub const BREAKER_CLOSED: MetricDef = MetricDef {
    name: "circuit_breaker.closed",
    metric_type: MetricType::Counter,
    description: "Number of transitions back into the closed state. Tagged with key.",
};

pub const BREAKER_REJECTED: MetricDef = MetricDef {
    name: "circuit_breaker.rejected",
    metric_type: MetricType::Counter,
    description: "Number of calls vetoed without being attempted. Tagged with key.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BREAKER_OPENED,
    BREAKER_HALF_OPENED,
    BREAKER_CLOSED,
    BREAKER_REJECTED,
];
