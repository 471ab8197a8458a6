//! Tap configuration.
//!
//! The config file is Singer-style JSON (YAML is accepted too, since it is
//! parsed with `serde_yaml`). Environment variables are interpolated into the
//! raw text before parsing. Table specifications are read once at startup and
//! never change during a run.

mod vars;

pub use vars::{InterpolationResult, interpolate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{
    ConfigError, DuplicateTableSnafu, EmptyBucketSnafu, EmptySearchPatternSnafu,
    EmptyTableNameSnafu, EnvInterpolationSnafu, NoTablesSnafu, NonAsciiDelimiterSnafu,
    ReadFileSnafu, YamlParseSnafu, ZeroSampleRateSnafu,
};

/// Default location of the catalog written by discovery.
pub const DEFAULT_CATALOG_PATH: &str = "catalog.json";

/// Main tap configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bucket name, or a local directory (absolute path or `file://` URL).
    pub bucket: String,

    /// Files last modified at or before this instant are never synced.
    pub start_date: DateTime<Utc>,

    /// Table specifications, in configuration order.
    pub tables: Vec<TableSpec>,

    /// Appended to every table name to form its stream identifier.
    #[serde(default)]
    pub table_suffix: String,

    /// Degrade "no files" and "table not found" conditions to log lines.
    #[serde(default)]
    pub warning_if_no_files: bool,

    /// Proxies used for bucket access.
    #[serde(default)]
    pub s3_proxies: Option<ProxyConfig>,

    /// Custom S3-compatible endpoint.
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,

    /// AWS region of the bucket.
    #[serde(default)]
    pub aws_region: Option<String>,

    /// Where discovery persists the catalog.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
}

/// Proxy configuration, keyed by scheme like the `requests` convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub http: Option<String>,
    #[serde(default)]
    pub https: Option<String>,
}

impl ProxyConfig {
    /// The proxy to route bucket traffic through, preferring HTTPS.
    pub fn url(&self) -> Option<&str> {
        self.https.as_deref().or(self.http.as_deref())
    }
}

/// Configuration for one logical table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Name of the table; the stream identifier is this plus the table suffix.
    pub table_name: String,

    /// Regular expression searched for in object keys.
    pub search_pattern: String,

    /// Only keys under this prefix are listed.
    #[serde(default)]
    pub search_prefix: Option<String>,

    /// Columns forming the primary key of the stream.
    #[serde(default)]
    pub key_properties: Vec<String>,

    /// Columns always typed as date-time strings.
    #[serde(default)]
    pub date_overrides: HashSet<String>,

    /// Columns always typed as strings.
    #[serde(default)]
    pub string_overrides: HashSet<String>,

    /// When false every column is typed as a nullable string.
    #[serde(default = "default_guess_types")]
    pub guess_types: bool,

    /// CSV field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Every n-th row of a file is sampled during discovery.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: usize,

    /// Maximum rows sampled per file during discovery.
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Maximum files sampled per table during discovery.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_guess_types() -> bool {
    true
}

fn default_delimiter() -> char {
    ','
}

fn default_sample_rate() -> usize {
    5
}

fn default_max_records() -> usize {
    1000
}

fn default_max_files() -> usize {
    5
}

impl TableSpec {
    /// Create a table spec with default options.
    pub fn new(table_name: impl Into<String>, search_pattern: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            search_pattern: search_pattern.into(),
            search_prefix: None,
            key_properties: Vec::new(),
            date_overrides: HashSet::new(),
            string_overrides: HashSet::new(),
            guess_types: default_guess_types(),
            delimiter: default_delimiter(),
            sample_rate: default_sample_rate(),
            max_records: default_max_records(),
            max_files: default_max_files(),
        }
    }

    /// Delimiter as the single byte the CSV reader expects.
    ///
    /// `Config::validate` rejects non-ASCII delimiters.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}

impl Config {
    /// Load configuration from a file, interpolating environment variables.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&content)
    }

    /// Parse configuration from JSON or YAML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let result = interpolate(content);
        if !result.is_ok() {
            return EnvInterpolationSnafu {
                message: result.errors.join("\n"),
            }
            .fail();
        }

        let config: Config = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.bucket.trim().is_empty(), EmptyBucketSnafu);
        ensure!(!self.tables.is_empty(), NoTablesSnafu);

        let mut seen = HashSet::new();
        for (index, table) in self.tables.iter().enumerate() {
            ensure!(!table.table_name.is_empty(), EmptyTableNameSnafu { index });
            ensure!(
                !table.search_pattern.is_empty(),
                EmptySearchPatternSnafu {
                    table: &table.table_name
                }
            );
            ensure!(
                table.sample_rate > 0,
                ZeroSampleRateSnafu {
                    table: &table.table_name
                }
            );
            ensure!(
                table.delimiter.is_ascii(),
                NonAsciiDelimiterSnafu {
                    table: &table.table_name,
                    delimiter: table.delimiter,
                }
            );
            ensure!(
                seen.insert(table.table_name.as_str()),
                DuplicateTableSnafu {
                    table: &table.table_name
                }
            );
        }
        Ok(())
    }

    /// Stream identifier for a table: its name plus the configured suffix.
    pub fn stream_id(&self, table: &TableSpec) -> String {
        format!("{}{}", table.table_name, self.table_suffix)
    }

    /// Find the table whose stream identifier equals `stream_id`.
    pub fn table_for_stream(&self, stream_id: &str) -> Option<&TableSpec> {
        self.tables
            .iter()
            .find(|table| self.stream_id(table) == stream_id)
    }
}
