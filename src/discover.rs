//! Stream discovery.
//!
//! Samples the input files of every configured table, infers a schema from
//! the samples and persists the resulting catalog.

use serde_json::{Map, Value, json};
use snafu::prelude::*;
use tracing::{info, warn};

use crate::catalog::{Catalog, MetadataEntry, StreamDefinition};
use crate::config::{Config, TableSpec};
use crate::emit;
use crate::error::{
    DiscoveryError, DiscoveryStorageSnafu, InferenceSnafu, NoStreamsFoundSnafu, PersistSnafu,
    SampleSnafu,
};
use crate::metrics::events::RowsSampled;
use crate::schema::{infer_schema, stream_schema};
use crate::source::{CsvReader, sample_rows};
use crate::storage::StorageProvider;
use crate::types::RowSample;

/// Build a stream definition for every table with sampled rows, in
/// configuration order.
pub async fn discover_streams(
    config: &Config,
    storage: &StorageProvider,
) -> Result<Vec<StreamDefinition>, DiscoveryError> {
    let mut streams = Vec::with_capacity(config.tables.len());

    for table in &config.tables {
        let samples = sample_table(table, storage).await?;
        if samples.is_empty() {
            warn!(
                table = %table.table_name,
                "No sampled rows found; skipping table during discovery"
            );
            continue;
        }

        let fragment = infer_schema(&samples, table).context(InferenceSnafu {
            table: &table.table_name,
        })?;
        let schema = stream_schema(&fragment);
        streams.push(stream_definition(config, table, schema));
    }

    Ok(streams)
}

/// Sample rows from the oldest `max_files` input files of a table.
async fn sample_table(
    table: &TableSpec,
    storage: &StorageProvider,
) -> Result<Vec<RowSample>, DiscoveryError> {
    let files = storage
        .input_files_for_table(table, None)
        .await
        .context(DiscoveryStorageSnafu {
            table: &table.table_name,
        })?;

    let reader = CsvReader::for_table(table);
    let mut samples = Vec::new();

    for file in files.iter().take(table.max_files) {
        let content = storage
            .get(&file.location)
            .await
            .context(DiscoveryStorageSnafu {
                table: &table.table_name,
            })?;
        let result = reader.read(content, file.key()).context(SampleSnafu {
            table: &table.table_name,
        })?;

        let sampled = sample_rows(result.rows, table.sample_rate, table.max_records);
        info!(
            table = %table.table_name,
            "Sampled {} rows from {}",
            sampled.len(),
            file.key()
        );
        emit!(RowsSampled {
            count: sampled.len() as u64,
        });
        samples.extend(sampled);
    }

    Ok(samples)
}

/// Assemble the catalog entry of a table from its stream schema.
pub fn stream_definition(config: &Config, table: &TableSpec, schema: Value) -> StreamDefinition {
    let stream_id = config.stream_id(table);

    let mut root = Map::new();
    root.insert(
        "table-key-properties".to_string(),
        json!(table.key_properties),
    );
    let mut metadata = vec![MetadataEntry::root(root)];

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for name in properties.keys() {
            let inclusion = if table.key_properties.contains(name) {
                "automatic"
            } else {
                "available"
            };
            let mut entry = Map::new();
            entry.insert("inclusion".to_string(), json!(inclusion));
            metadata.push(MetadataEntry::property(name, entry));
        }
    }

    StreamDefinition {
        tap_stream_id: stream_id.clone(),
        stream: stream_id,
        schema,
        metadata,
    }
}

/// Discover streams and persist the catalog to `config.catalog_path`.
///
/// Zero streams is an error unless `warning_if_no_files` is set, in which
/// case an empty catalog is written.
pub async fn do_discover(
    config: &Config,
    storage: &StorageProvider,
) -> Result<Catalog, DiscoveryError> {
    info!("Starting discover");

    let streams = discover_streams(config, storage).await?;
    if streams.is_empty() {
        ensure!(config.warning_if_no_files, NoStreamsFoundSnafu);
        info!("No streams found; writing an empty catalog");
    }

    let catalog = Catalog::new(streams);
    catalog.save(&config.catalog_path).context(PersistSnafu)?;

    info!("Finished discover");
    Ok(catalog)
}
