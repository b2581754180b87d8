//! Stream URL parsing
//!
//! Splits a station URL into the pieces the HTTP layer needs: scheme (plain
//! or TLS transport), host (for DNS and the `Host` header), port and request
//! path. Parsing itself is delegated to the `url` crate.

use crate::{Error, Result};
use std::fmt;
use url::Url;

/// Transport scheme of a stream URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Port used when the URL does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A parsed `http://` or `https://` stream location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamUrl {
    scheme: Scheme,
    host: String,
    port: u16,
    /// Request target: path plus optional query, always starts with `/`
    path: String,
}

impl StreamUrl {
    /// Parse a stream URL.
    ///
    /// Leading whitespace is ignored. The URL must carry an explicit
    /// `scheme://` prefix; only `http` and `https` are accepted.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim_start();
        if !trimmed.contains("://") {
            return Err(Error::InvalidInput(format!("missing scheme in URL: {}", trimmed)));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| Error::InvalidInput(format!("invalid URL {}: {}", trimmed, e)))?;

        Self::from_url(&url)
    }

    fn from_url(url: &Url) -> Result<Self> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(Error::InvalidInput(format!("unsupported scheme: {}", other)));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("URL has no host: {}", url)))?
            .to_string();

        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    /// Build from already separated pieces (`open(host, path, port)` callers).
    ///
    /// `path` must start with `/`; an empty host is rejected.
    pub fn from_parts(scheme: Scheme, host: &str, port: u16, path: &str) -> Result<Self> {
        if host.is_empty() {
            return Err(Error::InvalidInput("empty host".to_string()));
        }
        if !path.starts_with('/') {
            return Err(Error::InvalidInput(format!("path must start with '/': {}", path)));
        }
        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Resolve a (possibly relative) redirect target against this URL
    pub fn join(&self, location: &str) -> Result<Self> {
        let base = Url::parse(&self.to_string())
            .map_err(|e| Error::InvalidInput(format!("invalid base URL {}: {}", self, e)))?;
        let joined = base
            .join(location.trim())
            .map_err(|e| Error::InvalidInput(format!("invalid location {}: {}", location, e)))?;
        Self::from_url(&joined)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme.as_str(), self.host, self.port, self.path)
    }
}
