//! Pools of interchangeable upstream instances and the clients that use them.
//!
//! A [`LiveAddressPool`] tracks which configured instances are currently in
//! rotation. Wired into a [`circuit_breaker::BreakerRegistry`] as an observer,
//! it drops an instance as soon as that instance's breaker opens and brings it
//! back once the breaker is ready to probe. A periodic refresh restores the
//! full configured set regardless of breaker state.

pub mod config;
pub mod geo;
pub mod metrics_defs;
pub mod pool;

pub use config::{GeoLocationConfig, PoolConfig};
pub use geo::{GeoInfo, GeoLocationClient, GeoLocationError};
pub use pool::{Address, LiveAddressPool, PoolError};
