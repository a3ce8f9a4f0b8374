//! Process-wide map of breakers, one per key.

use crate::breaker::{BreakerKey, BreakerObserver, CircuitBreaker};
use crate::config::BreakerConfig;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Hands out the breaker for a key, creating it on first use.
///
/// Creation goes through the map's entry API, so concurrent first uses of the
/// same key observe a single breaker. Breakers are never removed.
pub struct BreakerRegistry<K>
where
    K: BreakerKey + Eq + Hash,
{
    config: BreakerConfig,
    observers: Vec<Arc<dyn BreakerObserver<K>>>,
    breakers: DashMap<K, CircuitBreaker<K>>,
}

impl<K> BreakerRegistry<K>
where
    K: BreakerKey + Eq + Hash,
{
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            observers: Vec::new(),
            breakers: DashMap::new(),
        }
    }

    /// Attaches an observer to every breaker created from now on.
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver<K>>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn get(&self, key: &K) -> CircuitBreaker<K> {
        if let Some(breaker) = self.breakers.get(key) {
            return breaker.clone();
        }

        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(key = %key, "Creating circuit breaker");
                CircuitBreaker::new(key.clone(), self.config.clone(), self.observers.clone())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
