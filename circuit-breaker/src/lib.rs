//! Keyed circuit breakers guarding calls to degraded dependencies.
//!
//! A [`CircuitBreaker`] tracks one dependency (usually one upstream address)
//! and vetoes calls to it once it has failed often enough in a short window.
//! A [`BreakerRegistry`] hands out exactly one breaker per key for the life
//! of the process and attaches a shared set of [`BreakerObserver`]s to each.

pub mod breaker;
pub mod config;
pub mod metrics_defs;
pub mod registry;

pub use breaker::{BreakerError, BreakerKey, BreakerObserver, BreakerState, CircuitBreaker};
pub use config::{BreakerConfig, ValidationError};
pub use registry::BreakerRegistry;
