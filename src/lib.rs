//! tap-s3-csv: extract CSV files from object storage as a Singer tap.
//!
//! Discovery samples the CSV files of each configured table, infers a schema
//! per table and writes a catalog. Sync reads the catalog back and emits
//! SCHEMA, RECORD and STATE messages for every selected stream, resuming from
//! per-stream bookmarks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tap_s3_csv::{Config, FileExtractor, JsonLinesWriter, StorageProvider, sync_run};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let storage = Arc::new(StorageProvider::for_config(&config)?);
//!     let extractor = FileExtractor::new(storage.clone());
//!     let mut writer = JsonLinesWriter::stdout();
//!     let (summary, _state) =
//!         sync_run(&config, &storage, None, None, &extractor, &mut writer).await?;
//!     eprintln!("Synced {} rows", summary.total_rows());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod discover;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod schema;
pub mod source;
pub mod state;
pub mod storage;
pub mod sync;
pub mod types;

// Re-export main types
pub use catalog::{Catalog, StreamDefinition};
pub use config::{Config, TableSpec};
pub use discover::{discover_streams, do_discover};
pub use protocol::{JsonLinesWriter, Message, MessageWriter};
pub use schema::{SchemaFragment, infer_schema};
pub use state::RunState;
pub use storage::{StorageProvider, StorageProviderRef};
pub use sync::{FileExtractor, StreamExtractor, SyncSummary, sync_run, synchronize};
