//! xflow Document Model
//!
//! Mutable XML element trees used for working documents, module
//! configuration and the per-thread system document.
//!
//! # Core Concepts
//!
//! - [`Document`]: arena-backed element tree addressed by [`NodeId`]
//! - [`DomPath`]: slash-separated relative/absolute paths (`engine/release`, `../ID`, `./@name`)
//! - Cardinality-checked access: [`Document::get_1e`], [`Document::get_create_1e`]
//!
//! # Example
//!
//! ```rust
//! use xflow_dom::{Document, DomPath};
//!
//! let mut doc = Document::new("sys");
//! let path: DomPath = "engine/release".parse().unwrap();
//! let node = doc.get_create_1e(doc.root(), &path).unwrap();
//! doc.set_text(node, "1.0");
//! assert_eq!(doc.text_at("engine/release").as_deref(), Some("1.0"));
//! ```

#![warn(unreachable_pub)]

mod document;
mod error;
mod path;
mod xml;

pub use document::{local_part, Document, NodeId};
pub use error::{DomError, DomResult};
pub use path::{DomPath, PathError, Step};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
