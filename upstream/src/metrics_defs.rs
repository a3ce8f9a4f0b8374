//! Metrics definitions for upstream pools and clients.

use shared::metrics_defs::{MetricDef, MetricType};

pub const ADDRESS_REMOVED: MetricDef = MetricDef {
    name: "address_pool.removed",
    metric_type: MetricType::Counter,
    description: "Addresses taken out of rotation. Tagged with pool.",
};

pub const ADDRESS_ADDED: MetricDef = MetricDef {
    name: "address_pool.added",
    metric_type: MetricType::Counter,
    description: "Addresses put back into rotation. Tagged with pool.",
};

pub const POOL_REFRESHED: MetricDef = MetricDef {
    name: "address_pool.refreshed",
    metric_type: MetricType::Counter,
    description: "Number of full resets of the live set. Tagged with pool.",
};

pub const POOL_LIVE: MetricDef = MetricDef {
    name: "address_pool.live",
    metric_type: MetricType::Gauge,
    description: "Number of addresses currently in rotation. Tagged with pool.",
};

pub const GEO_LOOKUP_DURATION: MetricDef = MetricDef {
    name: "geolocation.lookup.duration",
    metric_type: MetricType::Histogram,
    description: "Geolocation lookup duration in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ADDRESS_REMOVED,
    ADDRESS_ADDED,
    POOL_REFRESHED,
    POOL_LIVE,
    GEO_LOOKUP_DURATION,
];
