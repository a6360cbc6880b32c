//! xflow Engine Core
//!
//! Runs XML-described modules against a database, keeping a per-thread system
//! document in step with the module call stack and moving file content
//! between working documents and storage.
//!
//! # Core Concepts
//!
//! - [`ContextStack`]: named document positions with scoped overlays
//! - [`StorageLocationDefinition`]: parsed-once description of where a file lives
//! - [`WorkingStorageLocation`]: one evaluation of a definition for one target
//! - [`ModuleCallStack`]: module/state transitions with registered listeners
//! - [`DomHandler`]: a labelled document opened and closed around each request
//! - [`SysDomHandler`]: the system document behind `:{sys}`, refreshed on transitions and per churn
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xflow_engine::prelude::*;
//!
//! let module = Module::parse_str(
//!     r#"<module name="upload" title="Upload">
//!          <state-list><state name="main" title="Main"/></state-list>
//!        </module>"#,
//! )
//! .unwrap();
//!
//! let mut stack = ModuleCallStack::new();
//! let uri = BaseUriBuilder::new("https://apps.example.com").unwrap();
//! let sys = SysDomHandler::create(
//!     &ThreadInfo::default(),
//!     &EngineConfig::default(),
//!     &SystemHostResolver,
//!     &uri,
//!     &mut stack,
//! )
//! .unwrap();
//!
//! stack.push_module(Arc::new(module), "default");
//! assert_eq!(sys.text("module/name").as_deref(), Some("upload"));
//! assert_eq!(sys.text("previous_module/title").as_deref(), Some("Start"));
//! ```

#![warn(unreachable_pub)]

pub mod bind;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod handler;
pub mod lob;
pub mod module;
pub mod stack;
pub mod storage;
pub mod sysdoc;
pub mod thread;

pub use bind::{BindExpr, BindSpec, ResolvedBind};
pub use config::EngineConfig;
pub use context::{ContextLabel, ContextStack, DocumentScope, LocalisedContext, ThreadDocuments};
pub use database::{DatabaseConnection, DatabaseStatement, ParsedStatement, Row, StatementType};
pub use error::{BindError, ConfigError, DatabaseError, EngineError, EngineResult};
pub use handler::{DomHandler, LoadPrecedence};
pub use lob::{LobKind, LobValue};
pub use module::{Module, StateDefinition};
pub use stack::{ListenerId, ModuleCall, ModuleCallStack, StackTransition};
pub use storage::{
    CacheKeyStrategy, StorageLocationDefinition, StorageLocationRegistry, UploadInfo,
    WorkingStorageLocation, WorkingUploadStorageLocation,
};
pub use sysdoc::{
    BaseUriBuilder, HostResolver, RequestInfo, SysDomHandler, SystemHostResolver, ThreadInfo,
    UriBuilder,
};
pub use thread::EngineThread;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bind::{BindExpr, BindSpec};
    pub use crate::config::EngineConfig;
    pub use crate::context::{ContextLabel, ContextStack};
    pub use crate::database::DatabaseConnection;
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::handler::DomHandler;
    pub use crate::lob::{LobKind, LobValue};
    pub use crate::module::Module;
    pub use crate::stack::{ModuleCallStack, StackTransition};
    pub use crate::storage::{StorageLocationDefinition, UploadInfo, WorkingStorageLocation};
    pub use crate::sysdoc::{
        BaseUriBuilder, RequestInfo, SysDomHandler, SystemHostResolver, ThreadInfo,
    };
    pub use crate::thread::EngineThread;
}
