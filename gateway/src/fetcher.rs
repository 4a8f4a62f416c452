//! Upstream fetcher, built on `hyper_util`'s legacy client over
//! `hyper-rustls`.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use gateway_core::{FetchBody, FetchRequest, FetchResponse, Fetcher, ResolveError};

use crate::registry::ServiceRegistry;

type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Path segments that serve a backend's own docs at its base URL rather
/// than under its service prefix.
const ROOT_SERVED_PATHS: [&str; 2] = ["docs", "redoc"];

pub struct HttpFetcher {
    client: HttpsClient,
    registry: ServiceRegistry,
}

impl HttpFetcher {
    pub fn new(registry: ServiceRegistry) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("native root certificates load")
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);
        Self { client, registry }
    }

    /// Builds the full upstream URL for a request:
    /// `base_url(service) + "/" + service + "/" + path`, except `path` in
    /// {`docs`, `redoc`} which serves at the base URL with no
    /// service-name repetition.
    fn build_url(&self, request: &FetchRequest) -> Result<url::Url, ResolveError> {
        let base = self
            .registry
            .base_url(&request.service)
            .ok_or_else(|| ResolveError::UnknownService(request.service.clone()))?;

        let mut url = base.clone();
        let trimmed_base = base.path().trim_end_matches('/').to_string();

        if ROOT_SERVED_PATHS.contains(&request.path.as_str()) {
            url.set_path(&format!("{trimmed_base}/{}", request.path));
        } else {
            url.set_path(&format!("{trimmed_base}/{}/{}", request.service, request.path));
        }

        if let Some(query) = &request.query {
            url.set_query(Some(query));
        }

        Ok(url)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ResolveError> {
        let url = self.build_url(&request)?;

        let mut headers = request.headers.clone();
        // Stripped before re-issuing: the body may have been rewritten by
        // earlier processing, so any inbound Content-Length would be stale.
        headers.remove(http::header::CONTENT_LENGTH);

        let mut builder = http::Request::builder().method(request.method.clone()).uri(url.as_str());
        *builder.headers_mut().expect("builder has no error yet") = headers;
        let http_request = builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| ResolveError::Transport(e.to_string()))?;

        let call = self.client.request(http_request);
        let response = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| ResolveError::Timeout)?
                .map_err(|e| ResolveError::Transport(e.to_string()))?,
            None => call.await.map_err(|e| ResolveError::Transport(e.to_string()))?,
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content_type = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let collect = response.into_body().collect();
        let body_timeout = request.timeout.unwrap_or(Duration::from_secs(30));
        let collected = tokio::time::timeout(body_timeout, collect)
            .await
            .map_err(|_| ResolveError::Timeout)?
            .map_err(|e| ResolveError::Transport(e.to_string()))?;
        let bytes = collected.to_bytes();

        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"));

        let body = if is_json {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| ResolveError::Transport(format!("invalid JSON body: {e}")))?;
            FetchBody::Json(value)
        } else {
            FetchBody::Raw { bytes, content_type }
        };

        Ok(FetchResponse { status, headers, body })
    }
}
