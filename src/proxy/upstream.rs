//! Passthrough client for the upstream backend.
//!
//! Bodies travel verbatim in both directions; only the credential header is
//! injected. Payload translation belongs to the upstream adapter, not here.

use axum::{
    body::Body,
    http::{header, HeaderMap, Method},
    response::Response,
};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::pool::Credential;

/// Inbound headers copied onto the upstream request.
const FORWARDED_HEADERS: [header::HeaderName; 2] = [header::CONTENT_TYPE, header::ACCEPT];

#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
    auth_header: String,
    auth_prefix: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_header: config.auth_header.clone(),
            auth_prefix: config.auth_prefix.clone(),
        })
    }

    /// Send `body` to `<base_url><path>` authenticated with `credential`,
    /// streaming the upstream response back unchanged.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
        credential: &Credential,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http_client.request(method, &url).header(
            self.auth_header.as_str(),
            format!("{}{}", self.auth_prefix, credential.expose_secret()),
        );
        for name in FORWARDED_HEADERS.iter() {
            if let Some(value) = headers.get(name) {
                request = request.header(name.clone(), value.clone());
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream_response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, url = %url, "Failed to reach upstream");
            Error::Upstream(e)
        })?;

        let status = upstream_response.status();
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                url = %url,
                credential = %credential.preview(),
                "Upstream returned error status"
            );
        }

        let mut builder = Response::builder().status(status);
        if let Some(content_type) = upstream_response.headers().get(header::CONTENT_TYPE) {
            builder = builder.header(header::CONTENT_TYPE, content_type.clone());
        }

        let stream = upstream_response.bytes_stream().inspect_err(move |e| {
            tracing::warn!(error = %e, url = %url, "Upstream stream interrupted");
        });

        builder
            .body(Body::from_stream(stream))
            .map_err(|e| Error::Internal(format!("Failed to build response: {}", e)))
    }
}
