//! Reading CSV input files.
//!
//! Decodes files fetched from the bucket into row samples, for both schema
//! discovery and extraction.

pub mod reader;

pub use reader::{CsvReader, CsvReaderConfig, ReadResult, sample_rows};
