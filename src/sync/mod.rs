//! Stream synchronization.
//!
//! For every catalog stream, in catalog order: resolve its table
//! specification, honor the stream's selection, emit the current state and the
//! stream schema, then hand the stream to a [`StreamExtractor`]. The extractor
//! owns any further state mutation, such as advancing bookmarks.

pub mod extract;

pub use extract::FileExtractor;

use async_trait::async_trait;
use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::{info, warn};

use crate::catalog::{Catalog, StreamDefinition};
use crate::config::{Config, TableSpec};
use crate::discover::do_discover;
use crate::emit;
use crate::error::{DiscoverSnafu, EmitSnafu, LoadCatalogSnafu, SyncError, TableNotFoundSnafu};
use crate::metrics::events::{StreamProcessed, StreamStatus};
use crate::protocol::MessageWriter;
use crate::state::RunState;
use crate::storage::StorageProvider;

/// Extracts the records of one stream.
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    /// Emit the records of `stream` and return how many were emitted.
    ///
    /// May mutate `state`, typically to advance the stream's bookmark.
    async fn sync_stream(
        &self,
        config: &Config,
        state: &mut RunState,
        table: &TableSpec,
        stream: &StreamDefinition,
        writer: &mut dyn MessageWriter,
    ) -> Result<u64, SyncError>;
}

/// Outcome of looking up the table specification of a stream.
#[derive(Debug, Clone, Copy)]
pub enum TableResolution<'a> {
    Matched(&'a TableSpec),
    /// No table matched and `warning_if_no_files` is set.
    Skipped,
}

/// Find the table whose name plus the configured suffix is `stream_id`.
///
/// No match is an error unless `warning_if_no_files` is set.
pub fn resolve_table<'a>(
    config: &'a Config,
    stream_id: &str,
) -> Result<TableResolution<'a>, SyncError> {
    match config.table_for_stream(stream_id) {
        Some(table) => Ok(TableResolution::Matched(table)),
        None if config.warning_if_no_files => {
            warn!(stream = %stream_id, "Expected table {stream_id} not found in catalog");
            Ok(TableResolution::Skipped)
        }
        None => TableNotFoundSnafu { stream: stream_id }.fail(),
    }
}

/// Row counts of the streams synced in a run, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub rows: IndexMap<String, u64>,
}

impl SyncSummary {
    pub fn total_rows(&self) -> u64 {
        self.rows.values().sum()
    }
}

/// Synchronize every stream of `catalog`.
///
/// Unmatched (in tolerant mode) and deselected streams produce no output and
/// are absent from the summary.
pub async fn synchronize(
    config: &Config,
    catalog: &Catalog,
    state: &mut RunState,
    extractor: &dyn StreamExtractor,
    writer: &mut dyn MessageWriter,
) -> Result<SyncSummary, SyncError> {
    info!("Starting sync.");
    let mut summary = SyncSummary::default();

    for stream in &catalog.streams {
        let stream_id = stream.tap_stream_id.as_str();

        let table = match resolve_table(config, stream_id)? {
            TableResolution::Matched(table) => table,
            TableResolution::Skipped => {
                emit!(StreamProcessed {
                    status: StreamStatus::Unmatched,
                });
                continue;
            }
        };

        if !stream.is_selected() {
            info!("{stream_id}: Skipping - not selected");
            emit!(StreamProcessed {
                status: StreamStatus::Deselected,
            });
            continue;
        }

        writer.write_state(state).context(EmitSnafu)?;
        writer
            .write_schema(stream_id, &stream.schema, &stream.key_properties())
            .context(EmitSnafu)?;

        info!("{stream_id}: Starting sync");
        let rows = extractor
            .sync_stream(config, state, table, stream, writer)
            .await?;
        info!("{stream_id}: Completed sync ({rows} rows)");

        emit!(StreamProcessed {
            status: StreamStatus::Synced,
        });
        summary.rows.insert(stream_id.to_string(), rows);
    }

    info!("Done syncing.");
    Ok(summary)
}

/// Synchronize with defaults for absent inputs.
///
/// Without a catalog, discovery runs first and the catalog it persisted is
/// read back from `config.catalog_path`. Without a state, the run starts from
/// an empty one. Returns the summary and the final state.
pub async fn sync_run(
    config: &Config,
    storage: &StorageProvider,
    catalog: Option<Catalog>,
    state: Option<RunState>,
    extractor: &dyn StreamExtractor,
    writer: &mut dyn MessageWriter,
) -> Result<(SyncSummary, RunState), SyncError> {
    let catalog = match catalog {
        Some(catalog) => catalog,
        None => {
            do_discover(config, storage).await.context(DiscoverSnafu)?;
            let catalog = Catalog::load(&config.catalog_path).context(LoadCatalogSnafu)?;
            info!(
                "Successfully loaded catalog from {}",
                config.catalog_path.display()
            );
            catalog
        }
    };
    let mut state = state.unwrap_or_default();

    let summary = synchronize(config, &catalog, &mut state, extractor, writer).await?;
    Ok((summary, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonLinesWriter, Message};
    use serde_json::json;
    use std::sync::Mutex;

    /// Emits no records; remembers which streams it was asked for and marks
    /// each in the state.
    #[derive(Default)]
    struct RecordingExtractor {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl StreamExtractor for RecordingExtractor {
        async fn sync_stream(
            &self,
            _config: &Config,
            state: &mut RunState,
            table: &TableSpec,
            stream: &StreamDefinition,
            _writer: &mut dyn MessageWriter,
        ) -> Result<u64, SyncError> {
            self.calls
                .lock()
                .unwrap()
                .push((stream.tap_stream_id.clone(), table.table_name.clone()));
            state.set_bookmark(&stream.tap_stream_id, "modified_since", "done");
            Ok(7)
        }
    }

    fn config(suffix: &str, tolerant: bool) -> Config {
        let mut config = Config::parse(
            r#"{"bucket": "raw-data", "start_date": "2024-01-01T00:00:00Z",
                "tables": [{"table_name": "orders", "search_pattern": "orders"}]}"#,
        )
        .unwrap();
        config.table_suffix = suffix.to_string();
        config.warning_if_no_files = tolerant;
        config
    }

    fn stream(id: &str, metadata: serde_json::Value) -> StreamDefinition {
        serde_json::from_value(json!({
            "tap_stream_id": id,
            "stream": id,
            "schema": {"type": "object", "properties": {"id": {"type": ["null", "integer"]}}},
            "metadata": metadata
        }))
        .unwrap()
    }

    fn messages(writer: JsonLinesWriter<Vec<u8>>) -> Vec<Message> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_suffix_match_syncs_stream() {
        let config = config("_suffix", false);
        let catalog = Catalog::new(vec![stream(
            "orders_suffix",
            json!([{"breadcrumb": [], "metadata": {"table-key-properties": ["id"]}}]),
        )]);
        let extractor = RecordingExtractor::default();
        let mut writer = JsonLinesWriter::new(Vec::new());
        let mut state = RunState::new();

        let summary = synchronize(&config, &catalog, &mut state, &extractor, &mut writer)
            .await
            .unwrap();

        assert_eq!(summary.rows.get("orders_suffix"), Some(&7));
        assert_eq!(
            extractor.calls.lock().unwrap().as_slice(),
            &[("orders_suffix".to_string(), "orders".to_string())]
        );
        assert_eq!(
            state.get_bookmark("orders_suffix", "modified_since"),
            Some(&json!("done"))
        );

        let messages = messages(writer);
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], Message::State { value } if value.is_empty()));
        assert!(matches!(
            &messages[1],
            Message::Schema { stream, key_properties, .. }
                if stream == "orders_suffix" && key_properties == &["id"]
        ));
    }

    #[tokio::test]
    async fn test_unmatched_stream_is_fatal() {
        let config = config("", false);
        let catalog = Catalog::new(vec![stream("orders_suffix", json!([]))]);
        let mut writer = JsonLinesWriter::new(Vec::new());

        let err = synchronize(
            &config,
            &catalog,
            &mut RunState::new(),
            &RecordingExtractor::default(),
            &mut writer,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::TableNotFound { ref stream } if stream == "orders_suffix"));
        assert_eq!(
            err.to_string(),
            "Expected table orders_suffix not found in catalog"
        );
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_stream_skipped_when_tolerant() {
        let config = config("", true);
        let catalog = Catalog::new(vec![
            stream("orders_suffix", json!([])),
            stream("orders", json!([])),
        ]);
        let extractor = RecordingExtractor::default();
        let mut writer = JsonLinesWriter::new(Vec::new());

        let summary = synchronize(
            &config,
            &catalog,
            &mut RunState::new(),
            &extractor,
            &mut writer,
        )
        .await
        .unwrap();

        assert_eq!(summary.rows.keys().collect::<Vec<_>>(), vec!["orders"]);
        assert_eq!(extractor.calls.lock().unwrap().len(), 1);
        let messages = messages(writer);
        assert!(messages.iter().all(|m| !matches!(
            m,
            Message::Schema { stream, .. } if stream == "orders_suffix"
        )));
    }

    #[tokio::test]
    async fn test_deselected_stream_emits_nothing() {
        let config = config("", false);
        let catalog = Catalog::new(vec![stream(
            "orders",
            json!([{"breadcrumb": [], "metadata": {"selected": false}}]),
        )]);
        let extractor = RecordingExtractor::default();
        let mut writer = JsonLinesWriter::new(Vec::new());

        let summary = synchronize(
            &config,
            &catalog,
            &mut RunState::new(),
            &extractor,
            &mut writer,
        )
        .await
        .unwrap();

        assert!(summary.rows.is_empty());
        assert!(extractor.calls.lock().unwrap().is_empty());
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn test_missing_selection_metadata_means_selected() {
        let config = config("", false);
        let catalog = Catalog::new(vec![stream("orders", json!([]))]);
        let extractor = RecordingExtractor::default();
        let mut writer = JsonLinesWriter::new(Vec::new());

        let summary = synchronize(
            &config,
            &catalog,
            &mut RunState::new(),
            &extractor,
            &mut writer,
        )
        .await
        .unwrap();

        assert_eq!(summary.total_rows(), 7);
        assert_eq!(extractor.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_state_emitted_before_each_schema() {
        let mut config = config("", false);
        config.tables.push(TableSpec::new("customers", "customers"));
        let catalog = Catalog::new(vec![stream("orders", json!([])), stream("customers", json!([]))]);
        let mut writer = JsonLinesWriter::new(Vec::new());
        let mut state = RunState::new();

        synchronize(
            &config,
            &catalog,
            &mut state,
            &RecordingExtractor::default(),
            &mut writer,
        )
        .await
        .unwrap();

        let messages = messages(writer);
        assert_eq!(messages.len(), 4);
        assert!(matches!(&messages[0], Message::State { value } if value.is_empty()));
        assert!(matches!(&messages[1], Message::Schema { stream, .. } if stream == "orders"));
        // The second STATE carries the bookmark set while syncing the first stream.
        assert!(matches!(
            &messages[2],
            Message::State { value } if value.get_bookmark("orders", "modified_since").is_some()
        ));
        assert!(matches!(&messages[3], Message::Schema { stream, .. } if stream == "customers"));
    }

    #[tokio::test]
    async fn test_sync_run_uses_supplied_inputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = config("", false);
        config.bucket = dir.path().display().to_string();
        let storage = StorageProvider::for_config(&config).unwrap();
        let catalog = Catalog::new(vec![stream("orders", json!([]))]);
        let mut initial = RunState::new();
        initial.set_bookmark("orders", "modified_since", "before");
        let mut writer = JsonLinesWriter::new(Vec::new());

        let (summary, state) = sync_run(
            &config,
            &storage,
            Some(catalog),
            Some(initial),
            &RecordingExtractor::default(),
            &mut writer,
        )
        .await
        .unwrap();

        assert_eq!(summary.total_rows(), 7);
        assert_eq!(
            state.get_bookmark("orders", "modified_since"),
            Some(&json!("done"))
        );
        let messages = messages(writer);
        assert!(matches!(
            &messages[0],
            Message::State { value } if value.get_bookmark("orders", "modified_since") == Some(&json!("before"))
        ));
    }
}
