//! Inventory from a JSON snapshot file.

use std::path::PathBuf;

use async_trait::async_trait;
use servsel_core::InventorySnapshot;

use super::{InventorySource, SourceError};

/// Reads an [`InventorySnapshot`] serialized as JSON, typically written by an
/// external exporter.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InventorySource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<InventorySnapshot, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(SourceError::Read)?;
        serde_json::from_str(&raw).map_err(|e| {
            SourceError::Parse(format!("{}: {e}", self.path.display()))
        })
    }
}
