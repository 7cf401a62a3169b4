//! Controller API documents and error definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the controller API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection or request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request did not complete in time.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// Controller answered with something other than success.
    #[error("unexpected status code: {0}")]
    Status(u16),

    /// Body was larger than the configured limit.
    #[error("response exceeded maximum size of {0} bytes")]
    TooLarge(u64),

    /// Body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// The caller gave up on the request.
    #[error("request cancelled")]
    Cancelled,

    /// A request argument was rejected before sending.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for controller API operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Response of `GET /version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Version {
    pub meta: bool,
    pub premium: bool,
    pub version: String,
}

/// One latency sample from a proxy's history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct History {
    /// Timestamp as reported by the controller.
    pub time: Option<String>,
    /// Round-trip time in milliseconds.
    pub delay: u16,
}

/// Kinds that make an entry a selector.
const SELECTOR_KINDS: [&str; 2] = ["selector", "urltest"];

/// One entry of the topology document: an outbound node or a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyEntry {
    /// Declared kind, e.g. "Selector", "URLTest", "Shadowsocks".
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub udp: bool,
    /// Latency samples, oldest first.
    pub history: Vec<History>,
    /// Currently active member (groups only).
    pub now: String,
    /// Member names in upstream order (groups only).
    pub all: Vec<String>,
}

impl ProxyEntry {
    /// True if the entry is a selector or url-test group.
    ///
    /// Matching ignores case and dashes, so `Selector`, `URLTest` and
    /// `url-test` all qualify.
    pub fn is_selector(&self) -> bool {
        let kind: String = self
            .kind
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        SELECTOR_KINDS.contains(&kind.as_str())
    }

    /// The most recent latency sample, if any.
    pub fn latest_delay(&self) -> Option<u16> {
        self.history.last().map(|h| h.delay)
    }
}

/// Response of `GET /proxies`: every node and group keyed by name, in
/// the order the controller sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Topology {
    pub proxies: IndexMap<String, ProxyEntry>,
}

impl Topology {
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn get(&self, name: &str) -> Option<&ProxyEntry> {
        self.proxies.get(name)
    }
}

/// Response of `GET /proxies/{name}/delay`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DelayResponse {
    pub delay: i64,
}

/// One sample of `GET /memory`, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Memory {
    pub inuse: u64,
    pub oslimit: u64,
}

/// One sample of `GET /traffic`, in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Traffic {
    pub up: u64,
    pub down: u64,
}

/// Response of `GET /config`: the controller's running settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ControllerConfig {
    pub port: u16,
    pub socks_port: u16,
    pub redir_port: u16,
    pub tproxy_port: u16,
    pub mixed_port: u16,
    pub allow_lan: bool,
    pub bind_address: String,
    /// Routing mode, e.g. "rule", "global", "direct".
    pub mode: String,
    /// Modes the controller accepts (sing-box only).
    pub mode_list: Vec<String>,
    pub log_level: String,
    pub ipv6: bool,
    pub tun: serde_json::Map<String, serde_json::Value>,
}
