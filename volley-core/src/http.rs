//! Turns request steps into HTTP calls and calls into outcomes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use volley_http::{HttpClient, HttpRequest, HttpResponse, Method};
use volley_metrics::{FailureKind, RequestOutcome};

use crate::protocol::ProtocolDefaults;
use crate::scenario::{ActionError, Check, Extract, RequestStep};
use crate::session::Session;

/// A request with every template resolved against one user's session.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub step: Arc<str>,
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

impl ResolvedRequest {
    pub fn resolve(
        step: &RequestStep,
        protocol: &ProtocolDefaults,
        session: &Session,
    ) -> Result<Self, ActionError> {
        let path = step.path.resolve(session)?;

        let mut headers: Vec<(String, String)> = protocol.headers().to_vec();
        for (name, value) in &step.headers {
            let value = value.resolve(session)?;
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value));
        }

        let body = match &step.body {
            Some(body) => Bytes::from(body.render(session)?),
            None => Bytes::new(),
        };

        Ok(Self {
            step: step.name.clone(),
            method: step.method.clone(),
            url: protocol.url_for(&path),
            headers,
            body,
            timeout: step.timeout.unwrap_or(protocol.request_timeout()),
        })
    }

    fn into_http(self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            timeout: Some(self.timeout),
        }
    }
}

/// Executes resolved requests on a shared client.
#[derive(Debug, Clone, Default)]
pub struct HttpExecutor {
    client: Arc<HttpClient>,
}

impl HttpExecutor {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Send one request and produce exactly one outcome.
    ///
    /// Extractors only run when every check passed; a missing extraction source fails the
    /// request as a check failure.
    pub async fn execute(
        &self,
        scenario: &Arc<str>,
        request: ResolvedRequest,
        checks: &[Check],
        extracts: &[Extract],
        session: &mut Session,
    ) -> RequestOutcome {
        let step = request.step.clone();

        let started = Instant::now();
        let result = self.client.request(request.into_http()).await;
        let latency = started.elapsed();

        let (status, failure, bytes_received) = match result {
            Ok(res) => {
                let passed = checks.iter().all(|c| check_passes(c, &res))
                    && extracts.iter().all(|e| apply_extract(e, &res, session));
                let failure = (!passed).then_some(FailureKind::Check);
                (Some(res.status), failure, res.body.len() as u64)
            }
            Err(err) => {
                let kind = err.transport_error_kind();
                let failure = if kind == volley_http::HttpTransportErrorKind::Timeout {
                    FailureKind::Timeout
                } else if kind.is_invalid_request() {
                    FailureKind::InvalidRequest
                } else {
                    FailureKind::Transport
                };
                tracing::trace!(step = %step, error = %err, "request failed");
                (None, Some(failure), 0)
            }
        };

        RequestOutcome {
            scenario: scenario.clone(),
            step,
            status,
            latency,
            failure,
            bytes_received,
        }
    }
}

fn check_passes(check: &Check, res: &HttpResponse) -> bool {
    match check {
        Check::Status(code) => res.status == *code,
        Check::StatusIn(codes) => codes.contains(&res.status),
        Check::BodyContains(needle) => {
            needle.is_empty()
                || res
                    .body
                    .windows(needle.len())
                    .any(|w| w == needle.as_bytes())
        }
        Check::HeaderPresent(name) => res.header(name).is_some(),
    }
}

fn apply_extract(extract: &Extract, res: &HttpResponse, session: &mut Session) -> bool {
    match extract {
        Extract::Header { header, into } => match res.header(header) {
            Some(v) => {
                session.set(into.clone(), v);
                true
            }
            None => false,
        },
        Extract::Body { into } => match res.body_utf8() {
            Some(body) => {
                session.set(into.clone(), body);
                true
            }
            None => false,
        },
        Extract::Status { into } => {
            session.set(into.clone(), i64::from(res.status));
            true
        }
    }
}
