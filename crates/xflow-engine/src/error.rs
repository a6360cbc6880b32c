//! Error types for the engine core
//!
//! Three tiers:
//! - [`ConfigError`]: load-time problems that abort module load
//! - [`BindError`] / [`DatabaseError`]: per-operation failures, surfaced to the caller
//! - degradations (hostname lookup, ambiguous status refresh) never become errors

use crate::context::ContextLabel;
use crate::lob::LobKind;
use xflow_dom::DomError;

/// Load-time configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Storage location has neither a database nor an API block
    #[error(
        "error in file-storage-location {name} - expected either a database or API driven file \
         storage location, or both; use a \"database\" and/or \"api\" sub-element to specify a way \
         to query and store an uploaded file"
    )]
    MissingStatementBlock { name: String },

    /// Storage location has no statement able to perform an operation
    #[error("file-storage-location {name} has no statement to {operation} the file")]
    MissingStatement {
        name: String,
        operation: &'static str,
    },

    /// Two storage locations share a name within one module
    #[error("duplicate storage location '{name}' in module '{module}'")]
    DuplicateStorageLocation { module: String, name: String },

    /// Two states share a name within one module
    #[error("duplicate state '{state}' in module '{module}'")]
    DuplicateState { module: String, state: String },

    /// Required attribute absent
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    /// Attribute present with an unusable value
    #[error("invalid value '{value}' for attribute '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    /// Statement text missing or blank
    #[error("statement '{purpose}' has no SQL text")]
    EmptyStatement { purpose: String },

    /// Statement placeholder with no `using` bind
    #[error("statement '{purpose}' references :{placeholder} with no matching using bind")]
    UnboundPlaceholder {
        purpose: String,
        placeholder: String,
    },

    /// Bind expression could not be parsed
    #[error("invalid bind expression '{expr}': {reason}")]
    InvalidBind { expr: String, reason: String },

    /// URL could not be parsed
    #[error("invalid url '{0}'")]
    InvalidUrl(String),

    /// Underlying document could not be parsed or navigated
    #[error("malformed definition: {0}")]
    Document(#[from] DomError),

    /// Engine configuration file could not be parsed
    #[error("invalid engine configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    /// Create missing attribute error
    pub fn missing_attribute(element: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            element: element.into(),
            attribute: attribute.into(),
        }
    }

    /// Create invalid attribute error
    pub fn invalid_attribute(
        element: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidAttribute {
            element: element.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create invalid bind error
    pub fn invalid_bind(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBind {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

/// Bind evaluation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Required bind matched nothing
    #[error("bind '{name}' ({expr}) did not resolve to a node")]
    Unresolved { name: String, expr: String },

    /// Bind matched several nodes
    #[error("bind '{name}' ({expr}) resolved to {count} nodes")]
    Ambiguous {
        name: String,
        expr: String,
        count: usize,
    },

    /// Bind refers to a context label that is not currently set
    #[error("context label '{0}' is not set")]
    LabelNotSet(ContextLabel),
}

/// Errors reported by a [`DatabaseConnection`](crate::database::DatabaseConnection)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// Connection could not be used
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// Statement execution failed
    #[error("statement '{purpose}' failed: {message}")]
    Statement { purpose: String, message: String },

    /// Statement expected a row and found none
    #[error("statement '{0}' returned no row")]
    NoRow(String),
}

impl DatabaseError {
    /// Create statement failure
    pub fn statement(purpose: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            purpose: purpose.into(),
            message: message.into(),
        }
    }
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Load-time configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bind evaluation failed while creating a working storage location
    #[error("bind evaluation failed for storage location '{location}': {source}")]
    Bind {
        location: String,
        #[source]
        source: BindError,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Document navigation failed
    #[error("document error: {0}")]
    Document(#[from] DomError),

    /// Internal engine failure wrapping its cause
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Write attempted through a read-only working location
    #[error("storage location '{0}' is read-only")]
    ReadOnly(String),

    /// Upload attempted into a location that does not accept uploads
    #[error("storage location '{0}' is not an upload target")]
    NotUploadTarget(String),

    /// LOB content of the wrong kind
    #[error("storage location '{location}' expects {expected} content, got {actual}")]
    LobKindMismatch {
        location: String,
        expected: LobKind,
        actual: LobKind,
    },

    /// Storage location lookup failed
    #[error("no storage location '{name}' in module '{module}'")]
    UnknownStorageLocation { module: String, name: String },

    /// State lookup failed
    #[error("module '{module}' has no state '{state}'")]
    UnknownState { module: String, state: String },

    /// Top module call has no state to pop
    #[error("module '{0}' has no active state")]
    NoActiveState(String),

    /// Operation needs a module call and the stack is empty
    #[error("module call stack is empty")]
    EmptyStack,
}

impl EngineError {
    /// Create internal error with a cause
    pub fn internal(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create internal error without a cause
    pub fn internal_msg(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Load-time errors that abort module load
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Errors confined to a single operation; the thread may continue
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Internal { .. } => false,
            Self::Bind { .. }
            | Self::Database(_)
            | Self::Document(_)
            | Self::ReadOnly(_)
            | Self::NotUploadTarget(_)
            | Self::LobKindMismatch { .. }
            | Self::UnknownStorageLocation { .. }
            | Self::UnknownState { .. }
            | Self::NoActiveState(_)
            | Self::EmptyStack => true,
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
