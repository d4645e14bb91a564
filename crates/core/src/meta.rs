use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view of a stored blob's record, minus the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    /// Payload length in bytes, as declared when the blob was stored.
    pub length: i64,
    /// When the blob was last written.
    pub last_modified: DateTime<Utc>,
    /// Diagnostic key/value pairs recorded alongside the payload.
    pub meta: HashMap<String, String>,
}
