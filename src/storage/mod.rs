//! Bucket access.
//!
//! Wraps an `object_store` backend for the configured bucket: S3 (including
//! S3-compatible endpoints and proxies) or a local directory for local runs.

mod local;
mod s3;

pub use local::LocalConfig;
pub use s3::S3Config;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, future};
use object_store::ObjectStore;
use object_store::path::Path;
use regex::Regex;
use snafu::prelude::*;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{Config, TableSpec};
use crate::emit;
use crate::error::{InvalidBucketSnafu, ObjectStoreSnafu, SearchPatternSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider for the configured bucket.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub location: Path,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl ObjectInfo {
    /// The object key within the bucket.
    pub fn key(&self) -> &str {
        self.location.as_ref()
    }
}

impl From<object_store::ObjectMeta> for ObjectInfo {
    fn from(meta: object_store::ObjectMeta) -> Self {
        Self {
            location: meta.location,
            last_modified: meta.last_modified,
            size: meta.size as u64,
        }
    }
}

// Bucket location patterns
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9][a-z0-9\-\.]*[a-z0-9])/?$";
const S3_BUCKET: &str = r"^(?P<bucket>[a-z0-9][a-z0-9\-\.]*[a-z0-9])$";
const FILE_URI: &str = r"^file://(?P<path>/.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

fn matchers() -> &'static [(Backend, Regex)] {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        [
            (Backend::Local, FILE_URI),
            (Backend::Local, FILE_PATH),
            (Backend::S3, S3_URL),
            (Backend::S3, S3_BUCKET),
        ]
        .into_iter()
        .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("valid bucket pattern")))
        .collect()
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Resolve the backend for the configured bucket.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        let bucket = config.bucket.trim();
        let captures = matchers()
            .iter()
            .find_map(|(backend, regex)| regex.captures(bucket).map(|c| (*backend, c)));

        match captures {
            Some((Backend::Local, captures)) => Ok(BackendConfig::Local(LocalConfig {
                path: captures["path"].to_string(),
            })),
            Some((Backend::S3, captures)) => Ok(BackendConfig::S3(S3Config {
                bucket: captures["bucket"].to_string(),
                region: config.aws_region.clone(),
                endpoint: config.aws_endpoint_url.clone(),
                proxy_url: config
                    .s3_proxies
                    .as_ref()
                    .and_then(|proxies| proxies.url())
                    .map(str::to_string),
            })),
            None => InvalidBucketSnafu { bucket }.fail(),
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the configured bucket.
    pub fn for_config(config: &Config) -> Result<Self, StorageError> {
        match BackendConfig::from_config(config)? {
            BackendConfig::S3(s3) => Self::construct_s3(s3),
            BackendConfig::Local(local) => Self::construct_local(local),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// List objects whose key starts with `prefix`.
    ///
    /// The prefix is a plain string prefix, as in S3 `ListObjectsV2`, so
    /// `exports/ord` matches `exports/orders-1.csv`. The backend is listed
    /// from the prefix's last `/` and keys are filtered afterwards.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>, StorageError> {
        let start = Instant::now();
        let prefix = prefix.unwrap_or_default();
        let parent = prefix.rsplit_once('/').map(|(dir, _)| Path::from(dir));

        let result: Result<Vec<ObjectInfo>, _> = self
            .object_store
            .list(parent.as_ref())
            .map_ok(ObjectInfo::from)
            .try_filter(|object| future::ready(object.key().starts_with(prefix)))
            .try_collect()
            .await;

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::List,
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)
    }

    /// Capability probe: list at most one key of the bucket.
    ///
    /// Returns the first key found, if any.
    pub async fn probe(&self) -> Result<Option<String>, StorageError> {
        let start = Instant::now();
        let mut stream = self.object_store.list(None);
        let result = stream.next().await.transpose();

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::from(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::List,
            duration: start.elapsed(),
        });

        Ok(result
            .context(ObjectStoreSnafu)?
            .map(|meta| meta.location.to_string()))
    }

    /// Get the contents of an object.
    pub async fn get(&self, location: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(location).await;

        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status: RequestStatus::from(&result),
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// List the input files of a table, oldest first.
    ///
    /// Keys are listed under the table's `search_prefix` and kept when the
    /// `search_pattern` regex matches anywhere in the key. Empty objects are
    /// skipped. With `modified_since`, only objects modified strictly after
    /// it are kept. Ties on modification time are ordered by key.
    pub async fn input_files_for_table(
        &self,
        table: &TableSpec,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectInfo>, StorageError> {
        let pattern = Regex::new(&table.search_pattern).context(SearchPatternSnafu {
            table: &table.table_name,
            pattern: &table.search_pattern,
        })?;

        info!(
            table = %table.table_name,
            "Checking bucket {} for keys matching '{}'",
            self.canonical_url,
            table.search_pattern
        );

        let listed = self.list(table.search_prefix.as_deref()).await?;
        let total_listed = listed.len();
        let mut files = Vec::new();

        for object in listed {
            if !pattern.is_match(object.key()) {
                continue;
            }
            if object.size == 0 {
                info!("Skipping matched file \"{}\" as it is empty", object.key());
                continue;
            }
            if modified_since.is_some_and(|since| object.last_modified <= since) {
                continue;
            }
            files.push(object);
        }

        debug!(
            table = %table.table_name,
            "Listed {} keys, {} are input files",
            total_listed,
            files.len()
        );

        files.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.location.as_ref().cmp(b.location.as_ref()))
        });

        Ok(files)
    }
}
