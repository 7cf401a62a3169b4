//! Atomically published proxy state.
//!
//! # Responsibilities
//! - Swap in a new snapshot per topology, all or nothing
//! - Serve lock-free reads of selectors and delays
//! - Apply latency test results in place and notify bound callbacks

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use thiserror::Error;

use crate::backend::{BackendError, Topology};
use crate::observability::metrics;
use crate::proxies::snapshot::{ProxySnapshot, SelectorMap};

/// Errors that can occur while refreshing proxy state.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The controller returned no proxies.
    #[error("no proxy data")]
    NoData,

    /// The topology could not be fetched.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Callback invoked with a node's new delay.
pub type DelayCallback = Arc<dyn Fn(u16) + Send + Sync>;

/// Holder of the current [`ProxySnapshot`] and per-node delay callbacks.
pub struct ProxyRegistry {
    current: ArcSwap<ProxySnapshot>,
    bindings: DashMap<String, Vec<DelayCallback>>,
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ProxySnapshot::default()),
            bindings: DashMap::new(),
        }
    }

    /// Parse `topology` and publish it. On error the previous snapshot stays.
    pub fn refresh(&self, topology: &Topology) -> Result<(), RegistryError> {
        let snapshot = ProxySnapshot::parse(topology)?;
        let selectors = snapshot.selectors().len();

        self.current.store(Arc::new(snapshot));

        metrics::record_snapshot_refresh(selectors);
        tracing::info!(
            component = "proxies",
            selectors,
            entries = topology.len(),
            "Proxy snapshot refreshed"
        );
        Ok(())
    }

    /// The snapshot currently in force.
    pub fn snapshot(&self) -> Arc<ProxySnapshot> {
        self.current.load_full()
    }

    pub fn has_snapshot(&self) -> bool {
        !self.current.load().is_empty()
    }

    /// Selectors of the current snapshot.
    pub fn load_selectors(&self) -> Arc<SelectorMap> {
        self.current.load().selectors()
    }

    /// Last known delay of `node`, 0 if never measured.
    pub fn get_delay(&self, node: &str) -> u16 {
        self.current.load().delay(node)
    }

    /// Record a latency result and run the callbacks bound to `node`.
    pub fn update_delay(&self, node: &str, delay: u16) {
        self.current.load().set_delay(node, delay);

        // Clone out so callbacks may bind more callbacks without deadlocking.
        let callbacks = self.bindings.get(node).map(|entry| entry.value().clone());
        for callback in callbacks.into_iter().flatten() {
            callback(delay);
        }
    }

    /// Run `callback` on every future [`update_delay`](Self::update_delay)
    /// of `node`. Callbacks accumulate and run in binding order.
    pub fn bind_delay<F>(&self, node: &str, callback: F)
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        self.bindings
            .entry(node.to_string())
            .or_default()
            .push(Arc::new(callback));
    }
}
