//! Documents a thread exposes to bind expressions under a context label
//!
//! Each handler owns one document. The thread opens every handler at the
//! start of a request, in [`LoadPrecedence`] order, and closes them in
//! reverse once the request's work is done.

use crate::context::ContextLabel;
use crate::database::DatabaseConnection;
use crate::error::EngineResult;
use crate::sysdoc::{RequestInfo, UriBuilder};
use std::fmt::{self, Display, Formatter};

/// Order in which handlers are opened
///
/// Lower values open first and close last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LoadPrecedence {
    /// Opened before anything that may read it
    High,
    /// Opened after high precedence handlers
    #[default]
    Medium,
    /// Opened last
    Low,
}

impl LoadPrecedence {
    /// Name used in logs
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Display for LoadPrecedence {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a labelled document, driven once per request
pub trait DomHandler {
    /// Label that bind expressions use to reach the document (`:{sys}`)
    fn context_label(&self) -> ContextLabel;

    /// Bring the document up to date for a request
    ///
    /// # Errors
    /// Implementation specific; the request does not run if any handler
    /// fails to open
    fn open(
        &self,
        request: &RequestInfo,
        uri: &dyn UriBuilder,
        conn: &mut dyn DatabaseConnection,
    ) -> EngineResult<()>;

    /// Release anything held for the request
    ///
    /// # Errors
    /// Implementation specific
    fn close(&self) -> EngineResult<()>;

    /// Whether the document is discarded between requests
    fn is_transient(&self) -> bool;

    /// Position in the open order
    fn load_precedence(&self) -> LoadPrecedence;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_orders_high_first() {
        let mut order = vec![LoadPrecedence::Low, LoadPrecedence::High, LoadPrecedence::Medium];
        order.sort();
        assert_eq!(
            order,
            vec![LoadPrecedence::High, LoadPrecedence::Medium, LoadPrecedence::Low]
        );
        assert_eq!(LoadPrecedence::default(), LoadPrecedence::Medium);
        assert_eq!(LoadPrecedence::Low.to_string(), "low");
    }
}
