//! Catalog of streams.
//!
//! Discovery writes the catalog as `{"streams": [...]}`; sync reads it back
//! when it was not handed one. Each stream carries its JSON schema and
//! breadcrumb-addressed metadata entries, the root entry (empty breadcrumb)
//! holding stream-level flags such as `selected` and `table-key-properties`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::path::Path;
use tracing::{error, info};

use crate::error::{CatalogError, CatalogJsonSnafu, CatalogReadSnafu, CatalogWriteSnafu};

/// The persisted set of streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<StreamDefinition>,
}

/// One stream of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub tap_stream_id: String,
    pub stream: String,
    pub schema: Value,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// Metadata attached to the stream (empty breadcrumb) or to one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub breadcrumb: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl MetadataEntry {
    /// Stream-level metadata.
    pub fn root(metadata: Map<String, Value>) -> Self {
        Self {
            breadcrumb: Vec::new(),
            metadata,
        }
    }

    /// Metadata of a single schema property.
    pub fn property(name: &str, metadata: Map<String, Value>) -> Self {
        Self {
            breadcrumb: vec!["properties".to_string(), name.to_string()],
            metadata,
        }
    }
}

impl StreamDefinition {
    fn root_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .iter()
            .find(|entry| entry.breadcrumb.is_empty())
            .map(|entry| &entry.metadata)
    }

    /// Whether the stream should be synced. Absent selection means selected.
    pub fn is_selected(&self) -> bool {
        self.root_metadata()
            .and_then(|metadata| metadata.get("selected"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Primary key columns declared in root metadata.
    pub fn key_properties(&self) -> Vec<String> {
        self.root_metadata()
            .and_then(|metadata| metadata.get("table-key-properties"))
            .and_then(Value::as_array)
            .map(|keys| {
                keys.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Catalog {
    pub fn new(streams: Vec<StreamDefinition>) -> Self {
        Self { streams }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Write the catalog as pretty-printed JSON.
    ///
    /// Failures are logged before being returned.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .context(CatalogJsonSnafu { path })
            .inspect_err(|e| error!("Failed to serialize catalog: {e}"))?;
        std::fs::write(path, content)
            .context(CatalogWriteSnafu { path })
            .inspect_err(|e| error!("Failed to write catalog to {}: {e}", path.display()))?;

        info!(
            "Wrote catalog with {} streams to {}",
            self.streams.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a catalog written by [`Catalog::save`] or supplied by the user.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(CatalogReadSnafu { path })
            .inspect_err(|e| error!("Failed to read catalog from {}: {e}", path.display()))?;
        serde_json::from_str(&content)
            .context(CatalogJsonSnafu { path })
            .inspect_err(|e| error!("Failed to parse catalog: {e}"))
    }
}
