//! Error types for the tap using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid bucket location.
    #[snafu(display("Invalid bucket location: {bucket}"))]
    InvalidBucket { bucket: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// Table search pattern is not a valid regular expression.
    #[snafu(display("Invalid search pattern '{pattern}' for table '{table}'"))]
    SearchPattern {
        table: String,
        pattern: String,
        source: regex::Error,
    },
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Bucket is empty.
    #[snafu(display("Bucket cannot be empty"))]
    EmptyBucket,

    /// No tables configured.
    #[snafu(display("At least one table must be configured"))]
    NoTables,

    /// A table has an empty name.
    #[snafu(display("Table at position {index} has an empty table_name"))]
    EmptyTableName { index: usize },

    /// A table has an empty search pattern.
    #[snafu(display("Table '{table}' has an empty search_pattern"))]
    EmptySearchPattern { table: String },

    /// Two tables share a name.
    #[snafu(display("Duplicate table_name: {table}"))]
    DuplicateTable { table: String },

    /// Sample rate must be positive.
    #[snafu(display("Table '{table}' has sample_rate 0; it must be at least 1"))]
    ZeroSampleRate { table: String },

    /// The CSV reader needs a single-byte delimiter.
    #[snafu(display("Table '{table}' has non-ASCII delimiter '{delimiter}'"))]
    NonAsciiDelimiter { table: String, delimiter: char },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse configuration.
    #[snafu(display("Failed to parse configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Inference Errors ============

/// Errors that can occur while inferring a schema from row samples.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InferenceError {
    /// Failed to write the normalized sample table.
    #[snafu(display("Failed to write sample table"))]
    SampleWrite { source: csv::Error },

    /// Failed to flush the normalized sample table.
    #[snafu(display("Failed to flush sample table"))]
    SampleFlush {
        source: csv::IntoInnerError<csv::Writer<Vec<u8>>>,
    },

    /// The sample table could not be parsed.
    #[snafu(display("Malformed sample table"))]
    TableParse { source: csv::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while decoding CSV files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Failed to decode a CSV record.
    #[snafu(display("Failed to decode CSV in {path}"))]
    CsvDecode { path: String, source: csv::Error },

    /// Required columns are missing from the file header.
    #[snafu(display("CSV file {path} missing required {kind} headers: {}", missing.join(", ")))]
    MissingHeaders {
        path: String,
        kind: &'static str,
        missing: Vec<String>,
    },
}

// ============ Catalog Errors ============

/// Errors that can occur while persisting or loading a catalog or state file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CatalogError {
    /// Failed to write the catalog file.
    #[snafu(display("Failed to write catalog file {}", path.display()))]
    CatalogWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the catalog file.
    #[snafu(display("Failed to read catalog file {}", path.display()))]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Catalog JSON is invalid or could not be serialized.
    #[snafu(display("Invalid catalog JSON in {}", path.display()))]
    CatalogJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to read the state file.
    #[snafu(display("Failed to read state file {}", path.display()))]
    StateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// State JSON is invalid.
    #[snafu(display("Invalid state JSON in {}", path.display()))]
    StateJson {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// ============ Protocol Errors ============

/// Errors that can occur while emitting protocol messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// Failed to serialize a message.
    #[snafu(display("Failed to serialize {kind} message"))]
    Serialize {
        kind: &'static str,
        source: serde_json::Error,
    },

    /// Failed to write a message to the output.
    #[snafu(display("Failed to write message"))]
    Output { source: std::io::Error },
}

// ============ Discovery Errors ============

/// Errors that can occur during discovery.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DiscoveryError {
    /// Discovery produced no streams and tolerant mode is off.
    #[snafu(display("No streams found"))]
    NoStreamsFound,

    /// Listing input files failed.
    #[snafu(display("Failed to list files for table '{table}'"))]
    DiscoveryStorage { table: String, source: StorageError },

    /// Decoding a sampled file failed.
    #[snafu(display("Failed to sample files for table '{table}'"))]
    Sample { table: String, source: ReaderError },

    /// Schema inference failed.
    #[snafu(display("Schema inference failed for table '{table}'"))]
    Inference {
        table: String,
        source: InferenceError,
    },

    /// Persisting the catalog failed.
    #[snafu(display("Failed to persist catalog"))]
    Persist { source: CatalogError },
}

// ============ Sync Errors ============

/// Errors that can occur while synchronizing streams.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SyncError {
    /// A catalog stream has no matching table specification.
    #[snafu(display("Expected table {stream} not found in catalog"))]
    TableNotFound { stream: String },

    /// Discovery failed while resolving a missing catalog.
    #[snafu(display("Discovery failed"))]
    Discover { source: DiscoveryError },

    /// Loading the persisted catalog failed.
    #[snafu(display("Failed to load catalog"))]
    LoadCatalog { source: CatalogError },

    /// Emitting a protocol message failed.
    #[snafu(display("Failed to emit message"))]
    Emit { source: ProtocolError },

    /// Listing or downloading a file failed.
    #[snafu(display("Storage error while syncing '{stream}'"))]
    SyncStorage {
        stream: String,
        source: StorageError,
    },

    /// Decoding a file failed.
    #[snafu(display("Failed to read file while syncing '{stream}'"))]
    SyncReader { stream: String, source: ReaderError },

    /// A bookmark or start date could not be parsed.
    #[snafu(display("Invalid bookmark '{value}' for '{stream}'"))]
    InvalidBookmark {
        stream: String,
        value: String,
        source: chrono::ParseError,
    },
}

// ============ Tap Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TapError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Storage setup error.
    #[snafu(display("Storage error"))]
    TapStorage { source: StorageError },

    /// Discovery error.
    #[snafu(display("Discovery error"))]
    TapDiscovery { source: DiscoveryError },

    /// Sync error.
    #[snafu(display("Sync error"))]
    TapSync { source: SyncError },

    /// Catalog or state loading error.
    #[snafu(display("Catalog error"))]
    TapCatalog { source: CatalogError },
}

impl From<ConfigError> for TapError {
    fn from(source: ConfigError) -> Self {
        TapError::Config { source }
    }
}

impl From<StorageError> for TapError {
    fn from(source: StorageError) -> Self {
        TapError::TapStorage { source }
    }
}

impl From<DiscoveryError> for TapError {
    fn from(source: DiscoveryError) -> Self {
        TapError::TapDiscovery { source }
    }
}

impl From<SyncError> for TapError {
    fn from(source: SyncError) -> Self {
        TapError::TapSync { source }
    }
}

impl From<CatalogError> for TapError {
    fn from(source: CatalogError) -> Self {
        TapError::TapCatalog { source }
    }
}
