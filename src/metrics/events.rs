//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence during discovery or
//! sync. Events implement the `InternalEvent` trait which emits the
//! corresponding metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when records of a stream are written as RECORD messages.
pub struct RecordsExtracted {
    pub stream: String,
    pub count: u64,
}

impl InternalEvent for RecordsExtracted {
    fn emit(self) {
        trace!(stream = %self.stream, count = self.count, "Records extracted");
        counter!("tap_records_extracted_total", "stream" => self.stream).increment(self.count);
    }
}

/// Event emitted when rows are sampled during discovery.
pub struct RowsSampled {
    pub count: u64,
}

impl InternalEvent for RowsSampled {
    fn emit(self) {
        trace!(count = self.count, "Rows sampled");
        counter!("tap_rows_sampled_total").increment(self.count);
    }
}

/// Outcome of a catalog stream in a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Synced,
    Deselected,
    Unmatched,
}

impl StreamStatus {
    fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Synced => "synced",
            StreamStatus::Deselected => "deselected",
            StreamStatus::Unmatched => "unmatched",
        }
    }
}

/// Event emitted once per catalog stream.
pub struct StreamProcessed {
    pub status: StreamStatus,
}

impl InternalEvent for StreamProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Stream processed");
        counter!("tap_streams_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when a file has been fully extracted.
pub struct FileSynced {
    pub duration: Duration,
}

impl InternalEvent for FileSynced {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "File synced");
        counter!("tap_files_synced_total").increment(1);
        histogram!("tap_file_sync_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Storage operation type.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

impl<T, E> From<&Result<T, E>> for RequestStatus {
    fn from(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "tap_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "tap_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
