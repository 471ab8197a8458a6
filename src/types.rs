//! Common types shared across discovery and sync.

use indexmap::IndexMap;
use serde_json::Value;

/// One decoded CSV row: column name to scalar value, in header order.
///
/// Samples from different files need not share the same keys.
pub type RowSample = IndexMap<String, Value>;

/// Column holding the bucket a record was read from.
pub const SDC_SOURCE_BUCKET_COLUMN: &str = "_sdc_source_bucket";

/// Column holding the object key a record was read from.
pub const SDC_SOURCE_FILE_COLUMN: &str = "_sdc_source_file";

/// Column holding the line number of a record within its file.
pub const SDC_SOURCE_LINENO_COLUMN: &str = "_sdc_source_lineno";

/// Column collecting cells beyond the header width.
pub const SDC_EXTRA_COLUMN: &str = "_sdc_extra";
