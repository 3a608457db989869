use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared read-only by every request of a simulation.
#[derive(Debug, Clone)]
pub struct ProtocolDefaults {
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl Default for ProtocolDefaults {
    fn default() -> Self {
        Self {
            base_url: None,
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProtocolDefaults {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().base_url(base_url)
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Add a default header. A later header with the same name (any case) replaces it.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn accept(self, value: impl Into<String>) -> Self {
        self.header("accept", value)
    }

    #[must_use]
    pub fn content_type(self, value: impl Into<String>) -> Self {
        self.header("content-type", value)
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url_str(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Check that the base url is an absolute http(s) url.
    pub fn validate(&self) -> Result<()> {
        let raw = self.base_url.as_deref().ok_or(Error::MissingBaseUrl)?;
        let url = url::Url::parse(raw).map_err(|_| Error::InvalidBaseUrl(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(Error::InvalidBaseUrl(raw.to_string()));
        }
        Ok(())
    }

    /// Join a resolved request path onto the base url. Absolute urls pass through unchanged.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.base_url.as_deref().unwrap_or_default().trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_base_url() {
        assert!(matches!(
            ProtocolDefaults::default().validate(),
            Err(Error::MissingBaseUrl)
        ));
        assert!(matches!(
            ProtocolDefaults::new("localhost:8080").validate(),
            Err(Error::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            ProtocolDefaults::new("ftp://example.com").validate(),
            Err(Error::InvalidBaseUrl(_))
        ));
        assert!(ProtocolDefaults::new("http://localhost:8080").validate().is_ok());
    }

    #[test]
    fn joins_paths_onto_base() {
        let p = ProtocolDefaults::new("http://localhost:8080/api/");
        assert_eq!(p.url_for("/links"), "http://localhost:8080/api/links");
        assert_eq!(p.url_for("links"), "http://localhost:8080/api/links");
        assert_eq!(p.url_for("https://other/x"), "https://other/x");
    }

    #[test]
    fn later_headers_replace_earlier_ones() {
        let p = ProtocolDefaults::new("http://h")
            .accept("text/plain")
            .header("Accept", "application/json")
            .content_type("application/json");
        assert_eq!(
            p.headers(),
            &[
                ("Accept".to_string(), "application/json".to_string()),
                ("content-type".to_string(), "application/json".to_string()),
            ]
        );
        assert_eq!(p.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
    }
}
