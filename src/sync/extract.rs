//! Extraction of a stream's records from its input files.
//!
//! Files modified after the stream's `modified_since` bookmark (or the
//! configured start date) are read oldest first. Every row becomes a RECORD
//! with its source bucket, key and line number attached. After each file the
//! bookmark advances to that file's modification time and a STATE is emitted,
//! so an interrupted run resumes at the first unfinished file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use snafu::prelude::*;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::StreamExtractor;
use crate::catalog::StreamDefinition;
use crate::config::{Config, TableSpec};
use crate::emit;
use crate::error::{EmitSnafu, InvalidBookmarkSnafu, SyncError, SyncReaderSnafu, SyncStorageSnafu};
use crate::metrics::events::{FileSynced, RecordsExtracted};
use crate::protocol::MessageWriter;
use crate::schema::PropertyTypes;
use crate::source::CsvReader;
use crate::state::RunState;
use crate::storage::{ObjectInfo, StorageProviderRef};
use crate::types::{
    RowSample, SDC_SOURCE_BUCKET_COLUMN, SDC_SOURCE_FILE_COLUMN, SDC_SOURCE_LINENO_COLUMN,
};

/// Bookmark key holding the modification time of the last synced file.
pub const MODIFIED_SINCE: &str = "modified_since";

/// Extracts streams from CSV files in the configured bucket.
#[derive(Debug, Clone)]
pub struct FileExtractor {
    storage: StorageProviderRef,
}

impl FileExtractor {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    async fn sync_file(
        &self,
        config: &Config,
        stream_id: &str,
        reader: &CsvReader,
        coercions: &HashMap<String, Coercion>,
        file: &ObjectInfo,
        writer: &mut dyn MessageWriter,
    ) -> Result<u64, SyncError> {
        info!(stream = %stream_id, "Syncing file \"{}\"", file.key());

        let content = self
            .storage
            .get(&file.location)
            .await
            .context(SyncStorageSnafu { stream: stream_id })?;
        let result = reader
            .read(content, file.key())
            .context(SyncReaderSnafu { stream: stream_id })?;

        let mut records = 0;
        for (index, row) in result.rows.into_iter().enumerate() {
            let mut record = to_record(row, coercions);
            record.insert(
                SDC_SOURCE_BUCKET_COLUMN.to_string(),
                Value::String(config.bucket.clone()),
            );
            record.insert(
                SDC_SOURCE_FILE_COLUMN.to_string(),
                Value::String(file.key().to_string()),
            );
            // The header is line 1.
            record.insert(
                SDC_SOURCE_LINENO_COLUMN.to_string(),
                Value::from(index as u64 + 2),
            );

            writer
                .write_record(stream_id, record, Utc::now())
                .context(EmitSnafu)?;
            records += 1;
        }

        Ok(records)
    }
}

#[async_trait]
impl StreamExtractor for FileExtractor {
    async fn sync_stream(
        &self,
        config: &Config,
        state: &mut RunState,
        table: &TableSpec,
        stream: &StreamDefinition,
        writer: &mut dyn MessageWriter,
    ) -> Result<u64, SyncError> {
        let stream_id = stream.tap_stream_id.as_str();
        let modified_since = modified_since(config, state, stream_id)?;

        let files = self
            .storage
            .input_files_for_table(table, Some(modified_since))
            .await
            .context(SyncStorageSnafu { stream: stream_id })?;
        info!(
            stream = %stream_id,
            "Found {} files to be synced modified since {}",
            files.len(),
            modified_since.to_rfc3339()
        );

        let reader = CsvReader::for_table(table);
        let coercions = coercions(&stream.schema);
        let mut records = 0;

        for file in &files {
            let start = Instant::now();
            let synced = self
                .sync_file(config, stream_id, &reader, &coercions, file, writer)
                .await?;
            records += synced;

            state.set_bookmark(stream_id, MODIFIED_SINCE, file.last_modified.to_rfc3339());
            writer.write_state(state).context(EmitSnafu)?;

            emit!(FileSynced {
                duration: start.elapsed(),
            });
            debug!(stream = %stream_id, "Wrote {} records from {}", synced, file.key());
        }

        emit!(RecordsExtracted {
            stream: stream_id.to_string(),
            count: records,
        });
        Ok(records)
    }
}

/// The stream's bookmark, or the configured start date when it has none.
fn modified_since(
    config: &Config,
    state: &RunState,
    stream_id: &str,
) -> Result<DateTime<Utc>, SyncError> {
    match state.get_bookmark(stream_id, MODIFIED_SINCE) {
        Some(Value::String(value)) => DateTime::parse_from_rfc3339(value)
            .map(|since| since.with_timezone(&Utc))
            .context(InvalidBookmarkSnafu {
                stream: stream_id,
                value,
            }),
        Some(other) => {
            warn!(stream = %stream_id, "Ignoring non-string bookmark {other}");
            Ok(config.start_date)
        }
        None => Ok(config.start_date),
    }
}

/// How a column's cells are converted before emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coercion {
    Integer,
    Number,
}

/// Columns the stream schema declares numeric.
fn coercions(schema: &Value) -> HashMap<String, Coercion> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return HashMap::new();
    };

    properties
        .keys()
        .filter_map(|column| {
            let types = PropertyTypes::of(schema, column);
            let coercion = if types.admits("integer") {
                Coercion::Integer
            } else if types.admits("number") {
                Coercion::Number
            } else {
                return None;
            };
            Some((column.clone(), coercion))
        })
        .collect()
}

/// Convert a row to a record. Empty cells become `null`; numeric cells that
/// fail to parse are passed through unchanged.
fn to_record(row: RowSample, coercions: &HashMap<String, Coercion>) -> Map<String, Value> {
    row.into_iter()
        .map(|(column, value)| {
            let value = match value {
                Value::String(cell) if cell.is_empty() => Value::Null,
                Value::String(cell) => match coercions.get(&column) {
                    Some(coercion) => coerce(cell, *coercion),
                    None => Value::String(cell),
                },
                other => other,
            };
            (column, value)
        })
        .collect()
}

fn coerce(cell: String, coercion: Coercion) -> Value {
    let trimmed = cell.trim();
    let parsed = match coercion {
        Coercion::Integer => trimmed.parse::<i64>().ok().map(Value::from).or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Value::from(f as i64))
        }),
        Coercion::Number => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
    };
    parsed.unwrap_or(Value::String(cell))
}
