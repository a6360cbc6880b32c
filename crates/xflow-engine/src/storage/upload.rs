//! Working storage locations receiving a newly uploaded file

use crate::database::DatabaseConnection;
use crate::error::{EngineError, EngineResult};
use crate::storage::working::WorkingStorageLocation;
use std::ops::Deref;
use xflow_dom::{Document, DomPath};

/// Metadata supplied by the client with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    /// Original file name
    pub filename: String,
    /// Declared MIME type
    pub content_type: String,
    /// Declared size in bytes
    pub size: u64,
}

impl UploadInfo {
    /// Create upload metadata
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size,
        }
    }
}

/// Writable working location plus the metadata of the file being uploaded
#[derive(Debug, Clone)]
pub struct WorkingUploadStorageLocation {
    working: WorkingStorageLocation,
    info: UploadInfo,
}

impl WorkingUploadStorageLocation {
    pub(crate) fn new(working: WorkingStorageLocation, info: UploadInfo) -> Self {
        Self { working, info }
    }

    /// Upload metadata
    #[inline]
    #[must_use]
    pub fn info(&self) -> &UploadInfo {
        &self.info
    }

    /// Underlying working location
    #[inline]
    #[must_use]
    pub fn working(&self) -> &WorkingStorageLocation {
        &self.working
    }

    /// Write the uploaded content, returning rows affected
    ///
    /// # Errors
    /// Any error from [`WorkingStorageLocation::write`]
    pub fn store(&mut self, conn: &mut dyn DatabaseConnection, content: Vec<u8>) -> EngineResult<u64> {
        let actual = content.len() as u64;
        if actual != self.info.size {
            tracing::warn!(
                location = self.working.definition().name(),
                filename = %self.info.filename,
                declared = self.info.size,
                actual,
                "upload size differs from declared size"
            );
        }
        let value = self.working.kind().from_bytes(content);
        self.working.write(conn, value)
    }

    /// Record the upload's metadata under its target element
    ///
    /// Writes `filename`, `content-type`, `size` and `storage-location`
    /// children, replacing earlier values.
    ///
    /// # Errors
    /// - `EngineError::Internal` if there was no target at evaluation time
    /// - `EngineError::Document` if a metadata element is ambiguous
    pub fn record_metadata(&self, doc: &mut Document) -> EngineResult<()> {
        let target = self
            .working
            .target()
            .ok_or_else(|| EngineError::internal_msg("upload has no target element"))?;
        let size = self.info.size.to_string();
        let fields = [
            ("filename", self.info.filename.as_str()),
            ("content-type", self.info.content_type.as_str()),
            ("size", size.as_str()),
            ("storage-location", self.working.definition().name()),
        ];
        for (name, value) in fields {
            let node = doc.get_create_1e(target, &DomPath::children([name]))?;
            doc.set_text(node, value);
        }
        Ok(())
    }
}

impl Deref for WorkingUploadStorageLocation {
    type Target = WorkingStorageLocation;

    fn deref(&self) -> &Self::Target {
        &self.working
    }
}
