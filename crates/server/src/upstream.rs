//! HTTP transport for calls to the accounting API.

use crate::error::UpstreamError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, header::HeaderName};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio::time::{Duration, timeout};
use tracing::debug;

pub const NETWORK_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared TLS configuration, built once per process.
static TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// Get the shared TLS client configuration using the ring provider and webpki roots.
pub fn get_shared_tls_config() -> Result<Arc<ClientConfig>, UpstreamError> {
    TLS_CONFIG
        .get_or_try_init(|| {
            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let provider = Arc::new(rustls::crypto::ring::default_provider());
            let config = ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .map_err(|e| UpstreamError::Transport(e.to_string()))?
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            Ok(Arc::new(config))
        })
        .cloned()
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Cloneable client for both `http` and `https` upstream URLs.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new() -> Result<Self, UpstreamError> {
        let tls = get_shared_tls_config()?;
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config((*tls).clone())
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self {
            client,
            timeout: Duration::from_secs(NETWORK_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and collect the whole response body.
    #[tracing::instrument(name = "upstream_send", level = "debug", skip(self, headers, body))]
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(HeaderName, String)],
        body: Bytes,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .header(hyper::header::USER_AGENT, USER_AGENT);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let body = timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(|e| UpstreamError::Transport(e.to_string()))?
            .to_bytes();
        debug!(%status, bytes = body.len(), "upstream response");

        Ok(UpstreamResponse { status, body })
    }
}
