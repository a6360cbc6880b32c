//! File storage locations
//!
//! A [`StorageLocationDefinition`] is parsed once when its module loads and
//! shared by every request. Each read or write evaluates it into a
//! [`WorkingStorageLocation`] scoped to one document position.

mod definition;
mod registry;
mod upload;
mod working;

pub use definition::{CacheKeyStrategy, StorageLocationDefinition};
pub use registry::StorageLocationRegistry;
pub use upload::{UploadInfo, WorkingUploadStorageLocation};
pub use working::WorkingStorageLocation;
