//! Run state.
//!
//! The state is an opaque JSON object threaded through a sync run and emitted
//! in STATE messages. The tap itself only reads and writes bookmarks under
//! `bookmarks.<stream>.<key>`; any other keys are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::path::Path;
use tracing::error;

use crate::error::{CatalogError, StateJsonSnafu, StateReadSnafu};

const BOOKMARKS: &str = "bookmarks";

/// Persisted progress markers of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    value: Map<String, Value>,
}

impl RunState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a state file given with `--state`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(StateReadSnafu { path })
            .inspect_err(|e| error!("Failed to read state file: {e}"))?;
        serde_json::from_str(&content)
            .context(StateJsonSnafu { path })
            .inspect_err(|e| error!("Failed to parse state file: {e}"))
    }

    pub fn get_bookmark(&self, stream: &str, key: &str) -> Option<&Value> {
        self.value
            .get(BOOKMARKS)
            .and_then(|bookmarks| bookmarks.get(stream))
            .and_then(|bookmark| bookmark.get(key))
    }

    /// Set `bookmarks.<stream>.<key>`, creating intermediate objects.
    pub fn set_bookmark(&mut self, stream: &str, key: &str, value: impl Into<Value>) {
        let bookmarks = object_entry(&mut self.value, BOOKMARKS);
        let bookmark = object_entry(bookmarks, stream);
        bookmark.insert(key.to_string(), value.into());
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl From<Map<String, Value>> for RunState {
    fn from(value: Map<String, Value>) -> Self {
        Self { value }
    }
}

/// The object under `key`, replacing any non-object value found there.
fn object_entry<'a>(map: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(object) => object,
        _ => unreachable!("entry was just made an object"),
    }
}
