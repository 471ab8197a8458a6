//! CSV file reader.
//!
//! Decodes a file's bytes into [`RowSample`]s keyed by the header row. Rows
//! shorter than the header yield `null` for the missing columns; cells beyond
//! the header width are collected under `_sdc_extra`.

use bytes::Bytes;
use serde_json::Value;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

use crate::config::TableSpec;
use crate::error::{CsvDecodeSnafu, MissingHeadersSnafu, ReaderError};
use crate::types::{RowSample, SDC_EXTRA_COLUMN};

/// Configuration for the CSV reader.
#[derive(Debug, Clone)]
pub struct CsvReaderConfig {
    /// Field delimiter.
    pub delimiter: u8,
    /// Columns every file of the table must have.
    pub key_properties: Vec<String>,
    /// Override columns every file of the table must have.
    pub date_overrides: Vec<String>,
}

impl CsvReaderConfig {
    /// Reader configuration for a table.
    pub fn for_table(table: &TableSpec) -> Self {
        let mut date_overrides: Vec<String> = table.date_overrides.iter().cloned().collect();
        date_overrides.sort();
        Self {
            delimiter: table.delimiter_byte(),
            key_properties: table.key_properties.clone(),
            date_overrides,
        }
    }
}

/// Result of reading a file.
#[derive(Debug, Default)]
pub struct ReadResult {
    /// Header row of the file.
    pub headers: Vec<String>,
    /// Data rows, in file order.
    pub rows: Vec<RowSample>,
}

/// A reader for delimited text files.
pub struct CsvReader {
    config: CsvReaderConfig,
}

impl CsvReader {
    pub fn new(config: CsvReaderConfig) -> Self {
        Self { config }
    }

    pub fn for_table(table: &TableSpec) -> Self {
        Self::new(CsvReaderConfig::for_table(table))
    }

    /// Decode a whole file.
    ///
    /// NUL bytes are stripped before decoding. Fails when a required key
    /// property or date override column is missing from the header.
    pub fn read(&self, content: Bytes, path: &str) -> Result<ReadResult, ReaderError> {
        let start = Instant::now();
        let content: Cow<[u8]> = if content.contains(&0) {
            Cow::Owned(content.iter().copied().filter(|&b| b != 0).collect())
        } else {
            Cow::Borrowed(content.as_ref())
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_ref());

        let headers: Vec<String> = reader
            .headers()
            .context(CsvDecodeSnafu { path })?
            .iter()
            .map(str::to_string)
            .collect();
        self.check_headers(&headers, path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context(CsvDecodeSnafu { path })?;
            rows.push(to_sample(&headers, &record));
        }

        debug!(
            "Read {} rows from {} in {}ms",
            rows.len(),
            path,
            start.elapsed().as_millis()
        );

        Ok(ReadResult { headers, rows })
    }

    fn check_headers(&self, headers: &[String], path: &str) -> Result<(), ReaderError> {
        let present: HashSet<&str> = headers.iter().map(String::as_str).collect();
        let missing = |required: &[String]| -> Vec<String> {
            required
                .iter()
                .filter(|column| !present.contains(column.as_str()))
                .cloned()
                .collect()
        };

        let missing_keys = missing(&self.config.key_properties);
        ensure!(
            missing_keys.is_empty(),
            MissingHeadersSnafu {
                path,
                kind: "key_properties",
                missing: missing_keys,
            }
        );

        let missing_dates = missing(&self.config.date_overrides);
        ensure!(
            missing_dates.is_empty(),
            MissingHeadersSnafu {
                path,
                kind: "date_overrides",
                missing: missing_dates,
            }
        );
        Ok(())
    }
}

fn to_sample(headers: &[String], record: &csv::StringRecord) -> RowSample {
    let mut sample: RowSample = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let value = record
                .get(i)
                .map(|cell| Value::String(cell.to_string()))
                .unwrap_or(Value::Null);
            (header.clone(), value)
        })
        .collect();

    if record.len() > headers.len() {
        let extra = record
            .iter()
            .skip(headers.len())
            .map(|cell| Value::String(cell.to_string()))
            .collect();
        sample.insert(SDC_EXTRA_COLUMN.to_string(), Value::Array(extra));
    }
    sample
}

/// Every `sample_rate`-th row starting with the first, at most `max_records`.
pub fn sample_rows(rows: Vec<RowSample>, sample_rate: usize, max_records: usize) -> Vec<RowSample> {
    rows.into_iter()
        .step_by(sample_rate.max(1))
        .take(max_records)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> CsvReader {
        CsvReader::for_table(&TableSpec::new("orders", "orders"))
    }

    #[test]
    fn test_read_rows_keyed_by_header() {
        let result = reader()
            .read(Bytes::from_static(b"id,name\n1,ann\n2,bob\n"), "a.csv")
            .unwrap();

        assert_eq!(result.headers, vec!["id", "name"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1]["name"], Value::String("bob".to_string()));
    }

    #[test]
    fn test_short_and_long_rows() {
        let result = reader()
            .read(Bytes::from_static(b"id,name\n1\n2,bob,x,y\n"), "a.csv")
            .unwrap();

        assert_eq!(result.rows[0]["name"], Value::Null);
        assert!(!result.rows[0].contains_key(SDC_EXTRA_COLUMN));
        assert_eq!(
            result.rows[1][SDC_EXTRA_COLUMN],
            serde_json::json!(["x", "y"])
        );
    }

    #[test]
    fn test_nul_bytes_stripped_and_delimiter() {
        let mut table = TableSpec::new("orders", "orders");
        table.delimiter = ';';
        let result = CsvReader::for_table(&table)
            .read(Bytes::from_static(b"id;na\0me\n1;a\0nn\n"), "a.csv")
            .unwrap();

        assert_eq!(result.headers, vec!["id", "name"]);
        assert_eq!(result.rows[0]["name"], Value::String("ann".to_string()));
    }

    #[test]
    fn test_missing_required_headers() {
        let mut table = TableSpec::new("orders", "orders");
        table.key_properties = vec!["id".to_string()];
        table.date_overrides.insert("created_at".to_string());
        let reader = CsvReader::for_table(&table);

        let err = reader
            .read(Bytes::from_static(b"name\nann\n"), "a.csv")
            .unwrap_err();
        assert!(matches!(
            err,
            ReaderError::MissingHeaders { kind: "key_properties", ref missing, .. } if missing == &["id"]
        ));

        let err = reader
            .read(Bytes::from_static(b"id,name\n1,ann\n"), "a.csv")
            .unwrap_err();
        assert!(matches!(
            err,
            ReaderError::MissingHeaders { kind: "date_overrides", .. }
        ));
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let err = reader()
            .read(Bytes::from_static(b"id\n\xff\xfe\n"), "a.csv")
            .unwrap_err();
        assert!(matches!(err, ReaderError::CsvDecode { .. }));
    }

    #[test]
    fn test_sample_rows() {
        let rows: Vec<RowSample> = (0..12)
            .map(|i| RowSample::from([("n".to_string(), Value::from(i))]))
            .collect();

        let sampled = sample_rows(rows.clone(), 5, 1000);
        let picked: Vec<&Value> = sampled.iter().map(|r| &r["n"]).collect();
        assert_eq!(picked, vec![&Value::from(0), &Value::from(5), &Value::from(10)]);

        assert_eq!(sample_rows(rows.clone(), 1, 4).len(), 4);
        assert_eq!(sample_rows(rows, 2, 1000).len(), 6);
    }
}
