//! HTTP transport
//!
//! Thin request executor shared by every remote call:
//! - URL construction from an endpoint and a query-parameter map
//! - status validation (any non-2xx is an error carrying the status)
//! - cancellation of all in-flight requests
//!
//! Cancellation is generation based. Every request captures a
//! [`RequestTicket`] and the current [`CancellationToken`] when it starts.
//! [`Transport::cancel_all_pending`] bumps the generation, cancels the token
//! and installs a fresh one, so a response that arrives after cancellation is
//! never delivered, and later requests run unaffected.

use reqwest::Url;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vtour_common::config::CatalogConfig;

const USER_AGENT: &str = concat!("vtour/", env!("CARGO_PKG_VERSION"));

/// Message attached to every non-2xx response
pub const UNSUCCESSFUL_RESPONSE: &str = "Unsuccessful response.";

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("{domain} error {status}: {message}")]
    Status {
        domain: String,
        status: u16,
        message: String,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// HTTP verbs supported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Where requests go, and which error domain their failures report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub domain: String,
}

impl Endpoint {
    pub fn from_config(config: &CatalogConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            host: config.host.clone(),
            path: config.path.clone(),
            domain: config.domain.clone(),
        }
    }
}

/// Snapshot of the cancellation generation taken when work starts
///
/// Stays current until the next [`Transport::cancel_all_pending`].
#[derive(Debug, Clone)]
pub struct RequestTicket {
    generation: u64,
    epoch: Arc<AtomicU64>,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.generation
    }
}

/// Shared HTTP executor
pub struct Transport {
    client: reqwest::Client,
    endpoint: Endpoint,
    token: Mutex<CancellationToken>,
    epoch: Arc<AtomicU64>,
}

impl Transport {
    pub fn new(endpoint: Endpoint, timeout: Duration, max_idle_per_host: usize) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(max_idle_per_host)
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            client,
            endpoint,
            token: Mutex::new(CancellationToken::new()),
            epoch: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, TransportError> {
        Self::new(
            Endpoint::from_config(config),
            Duration::from_secs(config.request_timeout_secs),
            config.max_connections_per_host,
        )
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Build `scheme://host/path[method][extension]?k=v&...`
    ///
    /// Parameters come from an ordered map, so the same inputs always yield
    /// the same URL.
    pub fn build_url(
        &self,
        method: Option<&str>,
        extension: Option<&str>,
        params: &BTreeMap<String, String>,
    ) -> Result<Url, TransportError> {
        let raw = format!(
            "{}://{}{}{}{}",
            self.endpoint.scheme,
            self.endpoint.host,
            self.endpoint.path,
            method.unwrap_or(""),
            extension.unwrap_or("")
        );
        let mut url = Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", raw, e)))?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params.iter());
        }
        Ok(url)
    }

    /// Ticket for the current generation
    pub fn ticket(&self) -> RequestTicket {
        self.session().0
    }

    fn session(&self) -> (RequestTicket, CancellationToken) {
        let token = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let ticket = RequestTicket {
            generation: self.epoch.load(Ordering::SeqCst),
            epoch: Arc::clone(&self.epoch),
        };
        (ticket, token.clone())
    }

    /// Abort every in-flight request and start a fresh generation
    pub fn cancel_all_pending(&self) {
        let mut token = self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let generation = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        token.cancel();
        *token = CancellationToken::new();
        info!(generation, "Cancelled pending requests");
    }

    /// Execute a request and return the raw response body
    pub async fn execute<B: Serialize + ?Sized>(
        &self,
        url: Url,
        method: HttpMethod,
        headers: Option<&BTreeMap<String, String>>,
        body: Option<&B>,
    ) -> Result<Vec<u8>, TransportError> {
        let (ticket, token) = self.session();

        let mut request = self.client.request(method.into(), url.clone());
        if let Some(headers) = headers {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(url = %url, method = ?method, generation = ticket.generation(), "Sending request");

        let exchange = async {
            let response = request.send().await.map_err(TransportError::Network)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    domain: self.endpoint.domain.clone(),
                    status: status.as_u16(),
                    message: UNSUCCESSFUL_RESPONSE.to_string(),
                });
            }
            let bytes = response.bytes().await.map_err(TransportError::Body)?;
            Ok(bytes.to_vec())
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(TransportError::Cancelled),
            result = exchange => result,
        };

        // A response racing a cancellation is discarded
        if !ticket.is_current() {
            debug!(url = %url, "Dropping response from a cancelled generation");
            return Err(TransportError::Cancelled);
        }

        if let Err(e) = &result {
            warn!(url = %url, error = %e, "Request failed");
        }
        result
    }

    /// Plain GET without body or headers
    pub async fn get(&self, url: Url) -> Result<Vec<u8>, TransportError> {
        self.execute::<()>(url, HttpMethod::Get, None, None).await
    }

    /// GET an absolute URL given as text
    pub async fn get_str(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        self.get(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> Transport {
        let endpoint = Endpoint {
            scheme: "https".into(),
            host: "api.example.com".into(),
            path: "/services/rest".into(),
            domain: "CatalogClient".into(),
        };
        Transport::new(endpoint, Duration::from_secs(5), 5).unwrap()
    }

    #[test]
    fn test_build_url_orders_parameters() {
        let transport = transport();
        let mut params = BTreeMap::new();
        params.insert("page".to_string(), "3".to_string());
        params.insert("bbox".to_string(), "1,2,3,4".to_string());
        params.insert("method".to_string(), "search".to_string());

        let first = transport.build_url(None, None, &params).unwrap();
        let second = transport.build_url(None, None, &params).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.as_str(),
            "https://api.example.com/services/rest?bbox=1%2C2%2C3%2C4&method=search&page=3"
        );
    }

    #[test]
    fn test_build_url_appends_method_and_extension() {
        let url = transport()
            .build_url(Some("/photos"), Some(".json"), &BTreeMap::new())
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/services/rest/photos.json");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_cancel_invalidates_outstanding_tickets() {
        let transport = transport();
        let before = transport.ticket();
        assert!(before.is_current());

        transport.cancel_all_pending();

        assert!(!before.is_current());
        let after = transport.ticket();
        assert!(after.is_current());
        assert_eq!(after.generation(), before.generation() + 1);
    }

    #[tokio::test]
    async fn test_get_str_rejects_relative_url() {
        let err = transport().get_str("not a url").await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_http_method_mapping() {
        assert_eq!(reqwest::Method::from(HttpMethod::Put), reqwest::Method::PUT);
        assert_eq!(reqwest::Method::from(HttpMethod::Delete), reqwest::Method::DELETE);
    }
}
