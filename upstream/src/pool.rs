//! Live address pool for one upstream service class.
//!
//! # Responsibilities
//! - Hold the configured addresses, resolved once at startup
//! - Track which of them are currently in rotation
//! - React to breaker transitions of individual addresses
//! - Periodically put every configured address back into rotation

use crate::metrics_defs::{ADDRESS_ADDED, ADDRESS_REMOVED, POOL_LIVE, POOL_REFRESHED};
use circuit_breaker::BreakerObserver;
use indexmap::IndexSet;
use parking_lot::Mutex;
use rand::Rng;
use shared::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A `host:port` pair as written in configuration.
pub type Address = String;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("no addresses configured")]
    Empty,

    #[error("could not resolve address {0}: {1}")]
    Unresolvable(Address, #[source] std::io::Error),

    #[error("no address available for {0}")]
    NoAddressAvailable(String),
}

#[derive(Debug)]
pub struct LiveAddressPool {
    name: String,
    configured: IndexSet<Address>,
    live: Mutex<IndexSet<Address>>,
}

impl LiveAddressPool {
    /// Builds a pool after checking that every address resolves.
    pub async fn resolve(
        name: impl Into<String>,
        addresses: &[Address],
    ) -> Result<Self, PoolError> {
        if addresses.is_empty() {
            return Err(PoolError::Empty);
        }

        for address in addresses {
            let mut resolved = tokio::net::lookup_host(address.as_str())
                .await
                .map_err(|e| PoolError::Unresolvable(address.clone(), e))?;

            if resolved.next().is_none() {
                return Err(PoolError::Unresolvable(
                    address.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no records found"),
                ));
            }
        }

        let name = name.into();
        let configured: IndexSet<Address> = addresses.iter().cloned().collect();
        tracing::info!(pool = %name, addresses = configured.len(), "Address pool ready");
        gauge!(POOL_LIVE, "pool" => name.clone()).set(configured.len() as f64);

        Ok(Self {
            name,
            live: Mutex::new(configured.clone()),
            configured,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Picks a live address uniformly at random.
    pub fn get_address(&self) -> Result<Address, PoolError> {
        let live = self.live.lock();
        if live.is_empty() {
            return Err(PoolError::NoAddressAvailable(self.name.clone()));
        }

        let index = rand::thread_rng().gen_range(0..live.len());
        live.get_index(index)
            .cloned()
            .ok_or_else(|| PoolError::NoAddressAvailable(self.name.clone()))
    }

    /// Takes an address out of rotation. Returns whether it was live.
    pub fn remove(&self, address: &str) -> bool {
        let mut live = self.live.lock();
        let removed = live.swap_remove(address);
        if removed {
            tracing::info!(pool = %self.name, address, "Address removed from rotation");
            counter!(ADDRESS_REMOVED, "pool" => self.name.clone()).increment(1);
            gauge!(POOL_LIVE, "pool" => self.name.clone()).set(live.len() as f64);
        }
        removed
    }

    /// Puts a configured address back into rotation. Unknown addresses are ignored.
    pub fn add(&self, address: &str) -> bool {
        if !self.configured.contains(address) {
            tracing::debug!(pool = %self.name, address, "Ignoring address outside the pool");
            return false;
        }

        let mut live = self.live.lock();
        let added = live.insert(address.to_string());
        if added {
            tracing::info!(pool = %self.name, address, "Address returned to rotation");
            counter!(ADDRESS_ADDED, "pool" => self.name.clone()).increment(1);
            gauge!(POOL_LIVE, "pool" => self.name.clone()).set(live.len() as f64);
        }
        added
    }

    /// Resets the live set to every configured address.
    pub fn refresh(&self) {
        let mut live = self.live.lock();
        tracing::debug!(
            pool = %self.name,
            live = live.len(),
            configured = self.configured.len(),
            "Refreshing address pool"
        );
        *live = self.configured.clone();
        counter!(POOL_REFRESHED, "pool" => self.name.clone()).increment(1);
        gauge!(POOL_LIVE, "pool" => self.name.clone()).set(live.len() as f64);
    }

    pub fn live_addresses(&self) -> Vec<Address> {
        self.live.lock().iter().cloned().collect()
    }

    pub fn configured_addresses(&self) -> impl Iterator<Item = &Address> {
        self.configured.iter()
    }

    /// Spawns the periodic refresh. The first refresh happens one interval
    /// from now; the task stops once the pool is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                pool.refresh();
            }
        })
    }
}

impl BreakerObserver<Address> for LiveAddressPool {
    fn on_open(&self, address: &Address) {
        self.remove(address);
    }

    fn on_half_open(&self, address: &Address) {
        self.add(address);
    }
}
