//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tray core.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the tray core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BoxConfig {
    /// Controller API connection settings.
    pub api: ApiConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Liveness polling settings.
    pub monitor: MonitorConfig,

    /// Subscriber delivery settings.
    pub notify: NotifyConfig,

    /// On-demand latency test settings.
    pub latency: LatencyConfig,
}

/// Controller API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// URL scheme, `http` or `https`. Anything else falls back to `http`.
    pub scheme: String,

    /// Controller host and port (e.g., "127.0.0.1:9090").
    pub host: String,

    /// Optional path prefix the controller is mounted under.
    pub path: String,

    /// Bearer secret sent with every request. Empty disables the header.
    pub secret: String,

    /// Human-friendly label shown instead of the host.
    pub label: String,

    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Largest accepted response body in bytes.
    pub max_response_size: u64,
}

/// Lower bound for [`ApiConfig::timeout_ms`].
pub const MIN_TIMEOUT_MS: u64 = 50;

/// Lower bound for [`ApiConfig::max_response_size`].
pub const MIN_RESPONSE_SIZE: u64 = 4096;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: "127.0.0.1:9090".to_string(),
            path: String::new(),
            secret: String::new(),
            label: String::new(),
            timeout_ms: 10_000,
            max_response_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

impl ApiConfig {
    /// Name shown to the user: the label if set, otherwise the host.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.host
        } else {
            &self.label
        }
    }

    /// Base URL of the controller API.
    pub fn endpoint(&self) -> String {
        let scheme = match self.scheme.as_str() {
            "http" | "https" => self.scheme.as_str(),
            _ => "http",
        };
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("{}://{}", scheme, self.host)
        } else {
            format!("{}://{}/{}", scheme, self.host, path)
        }
    }

    /// Request timeout, clamped to [`MIN_TIMEOUT_MS`].
    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.max(MIN_TIMEOUT_MS)
    }

    /// Response size limit, clamped to [`MIN_RESPONSE_SIZE`].
    pub fn effective_max_response_size(&self) -> u64 {
        self.max_response_size.max(MIN_RESPONSE_SIZE)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Turn logging off entirely.
    pub disable: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            disable: false,
        }
    }
}

/// Liveness polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between liveness probes in milliseconds.
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Subscriber delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// How long an error notification may wait on a full queue, in milliseconds.
    pub error_deadline_ms: u64,

    /// How long a status notification may wait on a full queue, in milliseconds.
    pub status_deadline_ms: u64,

    /// Capacity of each subscriber's queue.
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            error_deadline_ms: 1000,
            status_deadline_ms: 3000,
            queue_capacity: 4,
        }
    }
}

/// Latency test configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// URL the controller fetches through a node to time it.
    pub test_url: String,

    /// Upper bound handed to the controller for one test, in milliseconds.
    pub timeout_ms: u64,
}

/// Test URL used when none is configured.
pub const DEFAULT_TEST_URL: &str = "https://google.com/generate_204";

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            test_url: DEFAULT_TEST_URL.to_string(),
            timeout_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let mut api = ApiConfig {
            host: "localhost:9090".into(),
            ..Default::default()
        };
        assert_eq!(api.endpoint(), "http://localhost:9090");

        api.scheme = "https".into();
        api.path = "/clash/".into();
        assert_eq!(api.endpoint(), "https://localhost:9090/clash");

        api.scheme = "ftp".into();
        assert_eq!(api.endpoint(), "http://localhost:9090/clash");

        api.scheme = String::new();
        assert_eq!(api.endpoint(), "http://localhost:9090/clash");
    }

    #[test]
    fn test_display_name() {
        let mut api = ApiConfig::default();
        assert_eq!(api.display_name(), "127.0.0.1:9090");
        api.label = "home router".into();
        assert_eq!(api.display_name(), "home router");
    }

    #[test]
    fn test_clamped_limits() {
        let api = ApiConfig {
            timeout_ms: 1,
            max_response_size: 10,
            ..Default::default()
        };
        assert_eq!(api.effective_timeout_ms(), MIN_TIMEOUT_MS);
        assert_eq!(api.effective_max_response_size(), MIN_RESPONSE_SIZE);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BoxConfig = toml::from_str(
            r#"
            [api]
            host = "10.0.0.1:9090"
            secret = "s3cret"

            [notify]
            error_deadline_ms = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.api.host, "10.0.0.1:9090");
        assert_eq!(config.api.scheme, "http");
        assert_eq!(config.notify.error_deadline_ms, 300);
        assert_eq!(config.notify.status_deadline_ms, 3000);
        assert_eq!(config.monitor.interval_ms, 1000);
        assert_eq!(config.latency.test_url, DEFAULT_TEST_URL);
    }
}
