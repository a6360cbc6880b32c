//! Request metadata and thread identity recorded in the system document

use indexmap::IndexMap;

/// Header carrying the original client address behind proxies
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Incoming request as seen by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    method: String,
    request_uri: String,
    remote_address: String,
    query_string: Option<String>,
    headers: IndexMap<String, String>,
}

impl RequestInfo {
    /// Create request metadata
    #[must_use]
    pub fn new(method: impl Into<String>, request_uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            request_uri: request_uri.into(),
            ..Self::default()
        }
    }

    /// Set client address
    #[inline]
    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = address.into();
        self
    }

    /// Set query string (without the leading `?`)
    #[inline]
    #[must_use]
    pub fn with_query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    /// Add a header; names are case-insensitive
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// HTTP method
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path
    #[inline]
    #[must_use]
    pub fn request_uri(&self) -> &str {
        &self.request_uri
    }

    /// Client address
    #[inline]
    #[must_use]
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Query string, if the request had one
    #[inline]
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Header value
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Identity of the thread a system document belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Externally visible thread reference
    pub thread_ref: String,
    /// Application mnemonic
    pub app_mnem: String,
    /// Internal thread id
    pub thread_id: String,
    /// User session id
    pub session_id: String,
}

impl ThreadInfo {
    /// Create thread identity
    #[must_use]
    pub fn new(
        thread_ref: impl Into<String>,
        app_mnem: impl Into<String>,
        thread_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_ref: thread_ref.into(),
            app_mnem: app_mnem.into(),
            thread_id: thread_id.into(),
            session_id: session_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let request = RequestInfo::new("GET", "/fox/upload")
            .with_header("User-Agent", "curl/8")
            .with_header("X-Forwarded-For", "10.0.0.1");
        assert_eq!(request.header("user-agent"), Some("curl/8"));
        assert_eq!(request.header(FORWARDED_FOR_HEADER), Some("10.0.0.1"));
        assert_eq!(request.header("referer"), None);
        assert_eq!(request.query_string(), None);
    }
}
