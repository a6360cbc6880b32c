//! The system document
//!
//! A long-lived `sys` document per thread describing the thread, engine,
//! host, current request, database, module, state and theme. Subtrees are
//! refreshed independently; a refresh never disturbs unrelated subtrees.

mod handler;
mod host;
mod request;

pub use handler::{SysDomHandler, REFRESH_SKIPPED_METRIC, START_TITLE, SYS_ROOT};
pub use host::{BaseUriBuilder, HostResolver, SystemHostResolver, UriBuilder};
pub use request::{RequestInfo, ThreadInfo, FORWARDED_FOR_HEADER};
