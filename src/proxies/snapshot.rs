//! One parsed view of the controller's proxy topology.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;

use crate::backend::{ProxyEntry, Topology};
use crate::proxies::RegistryError;

/// Selector name → member descriptors, in upstream order.
pub type SelectorMap = IndexMap<String, Vec<ProxyEntry>>;

/// Selectors and delays derived from a single topology document.
///
/// `selectors` and `active` never change after parsing. `delays` accepts
/// in-place updates from latency tests.
#[derive(Debug, Default)]
pub struct ProxySnapshot {
    selectors: Arc<SelectorMap>,
    active: HashMap<String, String>,
    delays: DashMap<String, u16>,
    entries: usize,
}

impl ProxySnapshot {
    /// Parse a topology document.
    ///
    /// Empty selectors and members that name unknown entries are skipped
    /// with a warning; only an empty document is an error.
    pub fn parse(topology: &Topology) -> Result<Self, RegistryError> {
        if topology.is_empty() {
            return Err(RegistryError::NoData);
        }

        let mut selectors = SelectorMap::new();
        let mut active = HashMap::new();
        let mut delays: HashMap<String, u16> = HashMap::new();

        for (name, entry) in &topology.proxies {
            if !entry.is_selector() {
                if let Some(delay) = entry.latest_delay() {
                    delays.insert(name.clone(), delay);
                }
                continue;
            }

            if entry.all.is_empty() {
                tracing::warn!(
                    component = "proxies",
                    selector = %name,
                    "Selector is empty, skip it"
                );
                continue;
            }

            let members = entry
                .all
                .iter()
                .filter_map(|member| match topology.get(member) {
                    Some(node) => Some(node.clone()),
                    None => {
                        tracing::warn!(
                            component = "proxies",
                            selector = %name,
                            outbound = %member,
                            "Selector contains a non-existent outbound"
                        );
                        None
                    }
                })
                .collect();
            selectors.insert(name.clone(), members);

            if !entry.now.is_empty() {
                active.insert(name.clone(), entry.now.clone());
            }
        }

        // A selector has no history of its own; show its active member's.
        for name in selectors.keys() {
            let inherited = active.get(name).and_then(|member| delays.get(member)).copied();
            if let Some(delay) = inherited {
                delays.insert(name.clone(), delay);
            }
        }

        Ok(Self {
            selectors: Arc::new(selectors),
            active,
            delays: delays.into_iter().collect(),
            entries: topology.len(),
        })
    }

    pub fn selectors(&self) -> Arc<SelectorMap> {
        self.selectors.clone()
    }

    /// Member that was active in `selector` when the topology was fetched.
    pub fn active_member(&self, selector: &str) -> Option<&str> {
        self.active.get(selector).map(String::as_str)
    }

    /// Last known delay, 0 if never measured.
    pub fn delay(&self, node: &str) -> u16 {
        self.delays.get(node).map(|d| *d).unwrap_or(0)
    }

    /// All known delays.
    pub fn delays(&self) -> HashMap<String, u16> {
        self.delays
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub(crate) fn set_delay(&self, node: &str, delay: u16) {
        self.delays.insert(node.to_string(), delay);
    }

    /// True for the placeholder snapshot published before the first refresh.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
