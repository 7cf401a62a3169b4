//! Controller API client with timeout and size limits.
//!
//! # Responsibilities
//! - Build endpoint URLs under the configured base path
//! - Attach the bearer secret
//! - Enforce request timeouts and a response size cap
//! - Decode the controller's JSON documents
//! - Follow the newline-delimited `/memory` and `/traffic` streams

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backend::types::{
    BackendError, BackendResult, ControllerConfig, DelayResponse, Memory, Topology, Traffic,
    Version,
};
use crate::config::schema::{ApiConfig, DEFAULT_TEST_URL};
use crate::health::Probe;

/// Timeout handed to the controller when a latency test asks for none.
const DEFAULT_DELAY_TIMEOUT_MS: u64 = 500;

/// HTTP client for a Clash-compatible controller API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Same headers, but only a connect timeout: streams stay open.
    stream_http: reqwest::Client,
    endpoint: Url,
    timeout_ms: u64,
    max_response_size: u64,
}

impl ApiClient {
    /// Create a new client from configuration.
    pub fn new(config: &ApiConfig) -> BackendResult<Self> {
        let endpoint: Url = config
            .endpoint()
            .parse()
            .map_err(|e| BackendError::Endpoint(format!("'{}': {}", config.endpoint(), e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::Endpoint(endpoint.to_string()));
        }

        let mut headers = HeaderMap::new();
        if !config.secret.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.secret))
                .map_err(|e| BackendError::Endpoint(format!("invalid secret: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let timeout_ms = config.effective_timeout_ms();
        let http = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(Duration::from_millis(timeout_ms))
            // The controller usually sits behind the very proxy it controls.
            .no_proxy()
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;
        let stream_http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_millis(timeout_ms))
            .no_proxy()
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        tracing::info!(endpoint = %endpoint, "Controller API client initialized");

        Ok(Self {
            http,
            stream_http,
            endpoint,
            timeout_ms,
            max_response_size: config.effective_max_response_size(),
        })
    }

    /// The base URL requests are issued against.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch the controller version.
    pub async fn version(&self) -> BackendResult<Version> {
        let url = self.url(&["version"], &[])?;
        self.get_json(url).await
    }

    /// Single liveness check. Succeeds if the controller answers `/version`.
    pub async fn probe_liveness(&self) -> BackendResult<()> {
        self.version().await.map(|_| ())
    }

    /// Fetch the full proxy topology.
    pub async fn fetch_topology(&self) -> BackendResult<Topology> {
        let url = self.url(&["proxies"], &[])?;
        self.get_json(url).await
    }

    /// Ask the controller to time `node` against `test_url`.
    ///
    /// Returns the round-trip time in milliseconds; a non-positive answer
    /// from the controller is reported as 0.
    pub async fn measure_latency(
        &self,
        node: &str,
        test_url: &str,
        timeout_ms: u64,
    ) -> BackendResult<u16> {
        let test_url = if test_url.is_empty() { DEFAULT_TEST_URL } else { test_url };
        let timeout_ms = if timeout_ms == 0 { DEFAULT_DELAY_TIMEOUT_MS } else { timeout_ms };
        let timeout = timeout_ms.to_string();

        let url = self.url(
            &["proxies", node, "delay"],
            &[("url", test_url), ("timeout", timeout.as_str())],
        )?;
        let response: DelayResponse = self.get_json(url).await?;

        Ok(match response.delay {
            d if d <= 0 => 0,
            d => u16::try_from(d).unwrap_or(u16::MAX),
        })
    }

    /// Make `target` the active member of `selector`.
    pub async fn switch_active(&self, selector: &str, target: &str) -> BackendResult<()> {
        let url = self.url(&["proxies", selector], &[])?;
        let response = self
            .send(
                self.http
                    .request(Method::PUT, url)
                    .json(&serde_json::json!({ "name": target })),
            )
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                tracing::info!(selector = %selector, target = %target, "Selector switched");
                Ok(())
            }
            status => Err(BackendError::Status(status.as_u16())),
        }
    }

    /// Fetch the controller's running settings.
    pub async fn controller_config(&self) -> BackendResult<ControllerConfig> {
        let url = self.url(&["config"], &[])?;
        self.get_json(url).await
    }

    /// Change the routing mode, e.g. to "rule" or "global".
    pub async fn set_mode(&self, mode: &str) -> BackendResult<()> {
        if mode.is_empty() {
            return Err(BackendError::InvalidArgument("mode can not be empty".into()));
        }

        let url = self.url(&["config"], &[])?;
        let response = self
            .send(
                self.http
                    .request(Method::PATCH, url)
                    .json(&serde_json::json!({ "mode": mode })),
            )
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                tracing::info!(mode = %mode, "Mode changed");
                Ok(())
            }
            status => Err(BackendError::Status(status.as_u16())),
        }
    }

    /// Follow `/memory`, calling `handler` with every sample.
    ///
    /// Runs until the controller closes the stream, `cancel` fires, or the
    /// handler cancels the token it is given. The last two end with `Ok`.
    pub async fn stream_memory<F>(
        &self,
        cancel: &CancellationToken,
        handler: F,
    ) -> BackendResult<()>
    where
        F: FnMut(Memory, &CancellationToken),
    {
        self.stream_json("memory", cancel, handler).await
    }

    /// Follow `/traffic`, calling `handler` with every sample.
    ///
    /// Same termination rules as [`stream_memory`](Self::stream_memory).
    pub async fn stream_traffic<F>(
        &self,
        cancel: &CancellationToken,
        handler: F,
    ) -> BackendResult<()>
    where
        F: FnMut(Traffic, &CancellationToken),
    {
        self.stream_json("traffic", cancel, handler).await
    }

    async fn stream_json<T, F>(
        &self,
        path: &str,
        cancel: &CancellationToken,
        mut handler: F,
    ) -> BackendResult<()>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut(T, &CancellationToken),
    {
        let stop = cancel.child_token();
        let url = self.url(&[path], &[])?;

        let mut response = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(()),
            response = self.send(self.stream_http.get(url)) => response?,
        };
        if response.status() != StatusCode::OK {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let mut pending = Vec::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = stop.cancelled() => return Ok(()),
                chunk = response.chunk() => chunk.map_err(|e| self.map_error(e))?,
            };
            let Some(chunk) = chunk else {
                return Ok(());
            };
            pending.extend_from_slice(&chunk);

            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let sample: T =
                    serde_json::from_slice(line).map_err(|e| BackendError::Decode(e.to_string()))?;
                if stop.is_cancelled() {
                    return Ok(());
                }
                handler(sample, &stop);
            }

            if pending.len() as u64 > self.max_response_size {
                return Err(BackendError::TooLarge(self.max_response_size));
            }
        }
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> BackendResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> BackendResult<Response> {
        request.send().await.map_err(|e| self.map_error(e))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> BackendResult<T> {
        let response = self.send(self.http.get(url)).await?;
        if response.status() != StatusCode::OK {
            return Err(BackendError::Status(response.status().as_u16()));
        }
        let body = self.read_limited(response).await?;
        serde_json::from_slice(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// Read the body, refusing anything over `max_response_size` even when
    /// the controller sends no Content-Length.
    async fn read_limited(&self, mut response: Response) -> BackendResult<Vec<u8>> {
        let limit = self.max_response_size;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(BackendError::TooLarge(limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(BackendError::TooLarge(limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn map_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout_ms)
        } else {
            BackendError::Http(e.to_string())
        }
    }
}

impl Probe for ApiClient {
    fn probe(&self, cancel: CancellationToken) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(BackendError::Cancelled),
                result = self.probe_liveness() => result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(host: &str, path: &str) -> ApiClient {
        ApiClient::new(&ApiConfig {
            host: host.into(),
            path: path.into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let c = client("127.0.0.1:9090", "");
        assert_eq!(c.url(&["version"], &[]).unwrap().as_str(), "http://127.0.0.1:9090/version");

        let c = client("127.0.0.1:9090", "/api/");
        assert_eq!(
            c.url(&["proxies", "GLOBAL"], &[]).unwrap().as_str(),
            "http://127.0.0.1:9090/api/proxies/GLOBAL"
        );
    }

    #[test]
    fn test_url_escapes_node_names() {
        let c = client("127.0.0.1:9090", "");
        let url = c
            .url(
                &["proxies", "HK 01/fast", "delay"],
                &[("url", "https://a.b/c?d=1"), ("timeout", "500")],
            )
            .unwrap();
        assert_eq!(url.path(), "/proxies/HK%2001%2Ffast/delay");
        let query: Vec<_> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            query,
            [
                ("url".to_string(), "https://a.b/c?d=1".to_string()),
                ("timeout".to_string(), "500".to_string()),
            ]
        );
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = ApiClient::new(&ApiConfig {
            host: "bad host:xx".into(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Endpoint(_)));
    }
}
