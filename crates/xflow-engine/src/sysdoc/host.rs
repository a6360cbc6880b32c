//! Host and URI collaborators of the system document

use crate::error::ConfigError;
use std::io;
use std::net::ToSocketAddrs;
use url::Url;

/// Looks up the identity of the machine the engine runs on
pub trait HostResolver {
    /// Host name
    ///
    /// # Errors
    /// Any lookup failure
    fn hostname(&self) -> io::Result<String>;

    /// Primary address of the host
    ///
    /// # Errors
    /// Any lookup failure
    fn address(&self) -> io::Result<String>;
}

/// Resolves the local host from `HOSTNAME` or `/etc/hostname`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostResolver;

impl HostResolver for SystemHostResolver {
    fn hostname(&self) -> io::Result<String> {
        if let Ok(name) = std::env::var("HOSTNAME") {
            if !name.trim().is_empty() {
                return Ok(name.trim().to_string());
            }
        }
        let name = std::fs::read_to_string("/etc/hostname")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "empty hostname"));
        }
        Ok(name.to_string())
    }

    fn address(&self) -> io::Result<String> {
        let hostname = self.hostname()?;
        (hostname.as_str(), 0)
            .to_socket_addrs()?
            .next()
            .map(|a| a.ip().to_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))
    }
}

/// Builds URIs pointing back at the engine
pub trait UriBuilder {
    /// Server-relative URI of a servlet path
    fn servlet_uri(&self, servlet_path: &str) -> String;

    /// Absolute form of a server-relative URI
    ///
    /// # Errors
    /// `ConfigError::InvalidUrl` if the URI cannot be made absolute
    fn to_absolute(&self, uri: &str) -> Result<String, ConfigError>;
}

/// [`UriBuilder`] resolving against a fixed base URL and context path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUriBuilder {
    base: Url,
    context_path: String,
}

impl BaseUriBuilder {
    /// Create from a base URL such as `https://apps.example.com`
    ///
    /// # Errors
    /// `ConfigError::InvalidUrl` if `base` is not an absolute URL
    pub fn new(base: &str) -> Result<Self, ConfigError> {
        let base = Url::parse(base).map_err(|_| ConfigError::InvalidUrl(base.to_string()))?;
        Ok(Self {
            base,
            context_path: String::new(),
        })
    }

    /// Set the application context path (`/engine`)
    #[inline]
    #[must_use]
    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into().trim_end_matches('/').to_string();
        self
    }
}

impl UriBuilder for BaseUriBuilder {
    fn servlet_uri(&self, servlet_path: &str) -> String {
        format!("{}/{}", self.context_path, servlet_path.trim_start_matches('/'))
    }

    fn to_absolute(&self, uri: &str) -> Result<String, ConfigError> {
        self.base
            .join(uri)
            .map(String::from)
            .map_err(|_| ConfigError::InvalidUrl(uri.to_string()))
    }
}
