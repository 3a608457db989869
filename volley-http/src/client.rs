use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::util::{has_header, host_header_value, merge_headers};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client shared by every virtual user of a run.
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds; keep failed connects prompt.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);
        http_connector.set_nodelay(true);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Send one request and read the full response body.
    ///
    /// `req.timeout` bounds the whole exchange (connect, headers and body).
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        match req.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.exchange(req)).await {
                Ok(res) => res,
                Err(_) => Err(Error::Timeout(timeout)),
            },
            None => self.exchange(req).await,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let req = build_request(req)?;
        let (parts, body) = self.inner.request(req).await?.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body,
            headers: merge_headers(&parts.headers),
        })
    }
}

fn build_request(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    let HttpRequest {
        method,
        url: raw,
        headers,
        body,
        ..
    } = req;

    let parsed = url::Url::parse(&raw).map_err(|_| Error::InvalidUrl(raw.clone()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::UnsupportedScheme(raw));
    }
    let uri: hyper::Uri = raw.parse().map_err(|_| Error::InvalidUrl(raw.clone()))?;

    let mut builder = Request::builder().method(method).uri(uri);
    if !has_header(&headers, "host")
        && let Some(host) = host_header_value(&parsed)
    {
        builder = builder.header(http::header::HOST, host);
    }
    if !body.is_empty() && !has_header(&headers, "content-length") {
        builder = builder.header(http::header::CONTENT_LENGTH, body.len());
    }
    for (name, value) in &headers {
        builder = builder.header(
            http::header::HeaderName::from_bytes(name.as_bytes())?,
            http::header::HeaderValue::from_str(value)?,
        );
    }

    Ok(builder.body(Full::new(body))?)
}
