//! Sample-to-table normalization.
//!
//! Row samples are heterogeneous: files may disagree on columns, and short
//! rows omit trailing keys. Type guessing works on a single rectangular CSV
//! table, so the samples are rewritten under one header: the union of all
//! keys in order of first appearance. That order is also the key order of the
//! resulting schema.

use indexmap::IndexSet;
use serde_json::Value;
use snafu::prelude::*;
use std::borrow::Cow;

use crate::error::{InferenceError, SampleFlushSnafu, SampleWriteSnafu};
use crate::types::RowSample;

/// The de-duplicated union of all sample keys, first occurrence first.
pub fn header_set(samples: &[RowSample]) -> IndexSet<&str> {
    samples
        .iter()
        .flat_map(|sample| sample.keys())
        .map(String::as_str)
        .collect()
}

/// Render a scalar the way it appears in a CSV cell.
///
/// Missing values and nulls become empty cells.
fn cell(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

/// Write samples as a CSV table under the unified header.
///
/// Sample order is row order. Trailing line terminators are stripped so the
/// table never ends in an artifact blank row. No samples at all yields an
/// empty buffer.
pub fn samples_to_table(samples: &[RowSample]) -> Result<Vec<u8>, InferenceError> {
    let header = header_set(samples);
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&header).context(SampleWriteSnafu)?;
    for sample in samples {
        writer
            .write_record(header.iter().map(|column| cell(sample.get(*column)).into_owned()))
            .context(SampleWriteSnafu)?;
    }

    let mut buffer = writer.into_inner().context(SampleFlushSnafu)?;
    while matches!(buffer.last(), Some(b'\n' | b'\r')) {
        buffer.pop();
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(pairs: &[(&str, Value)]) -> RowSample {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_header_set_first_occurrence_order() {
        let samples = vec![
            sample(&[("b", json!("1")), ("a", json!("2"))]),
            sample(&[("c", json!("3")), ("a", json!("4"))]),
            sample(&[("a", json!("5")), ("d", json!("6")), ("b", json!("7"))]),
        ];

        let header: Vec<&str> = header_set(&samples).into_iter().collect();
        assert_eq!(header, vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn test_missing_columns_become_empty_cells() {
        let samples = vec![
            sample(&[("id", json!("1")), ("name", json!("ann"))]),
            sample(&[("id", json!("2"))]),
            sample(&[("name", json!("cat")), ("id", Value::Null)]),
        ];

        let table = String::from_utf8(samples_to_table(&samples).unwrap()).unwrap();
        assert_eq!(table, "id,name\n1,ann\n2,\n,cat");
    }

    #[test]
    fn test_trailing_terminators_stripped() {
        let samples = vec![sample(&[("id", json!("1"))])];

        let table = samples_to_table(&samples).unwrap();
        assert_eq!(table, b"id\n1");
    }

    #[test]
    fn test_non_string_scalars_rendered() {
        let samples = vec![sample(&[
            ("n", json!(42)),
            ("f", json!(1.5)),
            ("b", json!(true)),
            ("extra", json!(["x", "y"])),
        ])];

        let table = String::from_utf8(samples_to_table(&samples).unwrap()).unwrap();
        assert_eq!(table, "n,f,b,extra\n42,1.5,true,\"[\"\"x\"\",\"\"y\"\"]\"");
    }

    #[test]
    fn test_empty_samples_yield_empty_table() {
        assert!(samples_to_table(&[]).unwrap().is_empty());
        assert!(samples_to_table(&[RowSample::new()]).unwrap().is_empty());
    }
}
