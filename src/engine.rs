//! The tray core: status flag, notifier, proxy registry and monitor task,
//! owned together and handed to GUI collaborators by reference.
//!
//! # Ownership
//! - The status monitor is the single regular writer of the status flag
//! - The notifier's registry is shared by every GUI component
//! - The proxy registry is written by refreshes and latency results, read by all

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;

use crate::backend::{ApiClient, BackendResult, Topology};
use crate::config::BoxConfig;
use crate::events::{EventQueue, Notifier};
use crate::health::{MonitorHandle, StatusFlag, StatusMonitor};
use crate::lifecycle::Shutdown;
use crate::proxies::{ProxyRegistry, ProxySnapshot, RegistryError, SelectorMap};

/// Health monitoring and state distribution for one controller.
pub struct Engine {
    config: BoxConfig,
    client: ApiClient,
    status: Arc<StatusFlag>,
    notifier: Arc<Notifier>,
    proxies: Arc<ProxyRegistry>,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl Engine {
    /// Build an engine and its controller client from configuration.
    pub fn new(config: BoxConfig) -> BackendResult<Self> {
        let client = ApiClient::new(&config.api)?;
        Ok(Self::with_client(config, client))
    }

    /// Build an engine around an existing client.
    pub fn with_client(config: BoxConfig, client: ApiClient) -> Self {
        let status = Arc::new(StatusFlag::new());
        let notifier = Arc::new(Notifier::new(status.clone(), &config.notify));
        Self {
            config,
            client,
            status,
            notifier,
            proxies: Arc::new(ProxyRegistry::new()),
            monitor: Mutex::new(None),
        }
    }

    /// Start polling the controller. Stops on its own when `shutdown` fires.
    pub async fn start(&self, shutdown: &Shutdown) {
        let mut monitor = self.monitor.lock().await;
        if monitor.as_ref().is_some_and(MonitorHandle::is_running) {
            tracing::warn!("Status monitor already running");
            return;
        }

        let period = Duration::from_millis(self.config.monitor.interval_ms);
        let status_monitor = StatusMonitor::new(self.status.clone(), self.notifier.clone());
        let handle = status_monitor.start_with_token(self.client.clone(), period, shutdown.token());
        *monitor = Some(handle);

        tracing::info!(
            controller = %self.config.api.display_name(),
            endpoint = %self.client.endpoint(),
            "Engine started"
        );
    }

    /// Stop polling and wait for the monitor task to exit. Idempotent.
    pub async fn stop(&self) {
        let mut monitor = self.monitor.lock().await;
        if let Some(handle) = monitor.take() {
            handle.stop().await;
            tracing::info!("Engine stopped");
        }
    }

    pub fn config(&self) -> &BoxConfig {
        &self.config
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn proxies(&self) -> &Arc<ProxyRegistry> {
        &self.proxies
    }

    // --- Notifications ---

    /// Register a named subscriber. Panics on a duplicate name.
    pub fn subscribe(&self, name: &str) -> EventQueue {
        self.notifier.subscribe(name)
    }

    pub fn unsubscribe(&self, name: &str) {
        self.notifier.unsubscribe(name);
    }

    /// Whether the controller answered the last probe.
    pub fn current_status(&self) -> bool {
        self.status.is_up()
    }

    // --- Proxy state ---

    /// Publish a freshly fetched topology.
    pub fn refresh(&self, topology: &Topology) -> Result<(), RegistryError> {
        self.proxies.refresh(topology)
    }

    /// Fetch the topology from the controller and publish it.
    ///
    /// Meant for the down→up transition.
    pub async fn refresh_from_backend(&self) -> Result<Arc<ProxySnapshot>, RegistryError> {
        let topology = self.client.fetch_topology().await?;
        self.proxies.refresh(&topology)?;
        Ok(self.proxies.snapshot())
    }

    pub fn load_selectors(&self) -> Arc<SelectorMap> {
        self.proxies.load_selectors()
    }

    pub fn get_delay(&self, node: &str) -> u16 {
        self.proxies.get_delay(node)
    }

    pub fn update_delay(&self, node: &str, delay: u16) {
        self.proxies.update_delay(node, delay);
    }

    pub fn bind_delay<F>(&self, node: &str, callback: F)
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        self.proxies.bind_delay(node, callback);
    }

    // --- Controller actions ---

    /// Time `node` through the controller and record the result.
    ///
    /// A failed test is recorded as 0 so bound callbacks can show it.
    pub async fn measure_latency(&self, node: &str) -> BackendResult<u16> {
        let latency = &self.config.latency;
        match self
            .client
            .measure_latency(node, &latency.test_url, latency.timeout_ms)
            .await
        {
            Ok(delay) => {
                self.proxies.update_delay(node, delay);
                Ok(delay)
            }
            Err(e) => {
                tracing::warn!(node = %node, error = %e, "Latency test failed");
                self.proxies.update_delay(node, 0);
                Err(e)
            }
        }
    }

    /// Time every member of `selector` concurrently.
    ///
    /// Returns each member with its result, in member order.
    pub async fn measure_selector(&self, selector: &str) -> Vec<(String, BackendResult<u16>)> {
        let selectors = self.proxies.load_selectors();
        let Some(members) = selectors.get(selector) else {
            return Vec::new();
        };

        let results = join_all(members.iter().map(|m| self.measure_latency(&m.name))).await;
        tracing::info!(selector = %selector, members = members.len(), "Refresh delay finished");

        members.iter().map(|m| m.name.clone()).zip(results).collect()
    }

    /// Make `target` the active member of `selector`.
    pub async fn switch_active(&self, selector: &str, target: &str) -> BackendResult<()> {
        self.client.switch_active(selector, target).await
    }
}
