//! Local filesystem backend, used to run the tap against a directory.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{ObjectStoreSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local directory configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

impl StorageProvider {
    pub(super) fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        let store = LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?;
        let object_store: Arc<dyn ObjectStore> = Arc::new(store);

        Ok(Self {
            canonical_url: format!("file://{}", config.path),
            config: BackendConfig::Local(config),
            object_store,
        })
    }
}
