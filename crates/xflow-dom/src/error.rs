//! Error types for document access

use crate::path::PathError;

/// Errors raised by document navigation and parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// Path matched more nodes than the operation allows
    #[error("too many nodes matched '{path}' (found {count}, expected at most 1)")]
    TooMany { path: String, count: usize },

    /// Path matched nothing and cannot be created
    #[error("no node matched '{0}'")]
    NotFound(String),

    /// Path could not be parsed
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// XML text could not be parsed or written
    #[error("malformed xml: {0}")]
    Malformed(String),
}

impl DomError {
    /// Create a too-many error for a path
    pub fn too_many(path: impl ToString, count: usize) -> Self {
        Self::TooMany {
            path: path.to_string(),
            count,
        }
    }

    /// True for cardinality violations
    #[inline]
    #[must_use]
    pub fn is_too_many(&self) -> bool {
        matches!(self, Self::TooMany { .. })
    }
}

/// Result type alias for document operations
pub type DomResult<T> = Result<T, DomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_display() {
        let err = DomError::too_many("module/name", 2);
        assert_eq!(
            err.to_string(),
            "too many nodes matched 'module/name' (found 2, expected at most 1)"
        );
        assert!(err.is_too_many());
    }

    #[test]
    fn path_error_conversion() {
        let err: DomError = PathError::EmptySegment.into();
        assert!(matches!(err, DomError::InvalidPath(_)));
        assert!(!err.is_too_many());
    }
}
