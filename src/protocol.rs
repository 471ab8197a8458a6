//! Protocol message emission.
//!
//! Messages are written one JSON object per line. The ordering contract is
//! STATE, then SCHEMA, then RECORDs for each synced stream, with a STATE after
//! every completed file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;
use std::io::Write;

use crate::error::{OutputSnafu, ProtocolError, SerializeSnafu};
use crate::state::RunState;

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Map<String, Value>,
        time_extracted: DateTime<Utc>,
    },
    State {
        value: RunState,
    },
}

impl Message {
    fn kind(&self) -> &'static str {
        match self {
            Message::Schema { .. } => "SCHEMA",
            Message::Record { .. } => "RECORD",
            Message::State { .. } => "STATE",
        }
    }
}

/// Sink for protocol messages.
pub trait MessageWriter: Send {
    fn write_message(&mut self, message: &Message) -> Result<(), ProtocolError>;

    fn write_state(&mut self, state: &RunState) -> Result<(), ProtocolError> {
        self.write_message(&Message::State {
            value: state.clone(),
        })
    }

    fn write_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
    ) -> Result<(), ProtocolError> {
        self.write_message(&Message::Schema {
            stream: stream.to_string(),
            schema: schema.clone(),
            key_properties: key_properties.to_vec(),
        })
    }

    fn write_record(
        &mut self,
        stream: &str,
        record: Map<String, Value>,
        time_extracted: DateTime<Utc>,
    ) -> Result<(), ProtocolError> {
        self.write_message(&Message::Record {
            stream: stream.to_string(),
            record,
            time_extracted,
        })
    }
}

/// Writes messages as JSON lines, flushing after every STATE.
pub struct JsonLinesWriter<W> {
    inner: W,
}

impl<W: Write + Send> JsonLinesWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl JsonLinesWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> MessageWriter for JsonLinesWriter<W> {
    fn write_message(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let mut line = serde_json::to_vec(message).context(SerializeSnafu {
            kind: message.kind(),
        })?;
        line.push(b'\n');
        self.inner.write_all(&line).context(OutputSnafu)?;

        if matches!(message, Message::State { .. }) {
            self.inner.flush().context(OutputSnafu)?;
        }
        Ok(())
    }
}
