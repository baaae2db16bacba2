//! Isolation worker message protocol
//!
//! The worker writes one JSON-encoded message per line on stdout. Any
//! stdout line that does not decode as a message is passed through as
//! plain log output, so stray prints from a scanned module's tooling do
//! not break the stream. Worker exit code 0 means success.

use serde::{Deserialize, Serialize};

use crate::declarations::ModuleMetadata;

/// A message sent by the isolation worker to its host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerMessage {
    /// Informational status message
    Message { text: String },

    /// Progress report; `work` is a fraction in [0, 1]
    Progress { work: f32, text: String },

    /// Log line
    Log { text: String },

    /// Non-fatal warning
    Warning { text: String },

    /// Scan error for the current file
    Error { text: String },

    /// Unexpected worker failure with diagnostic detail
    Exception { text: String },

    /// The operation was cancelled
    Cancel,

    /// Terminal message carrying the scan result; `None` means the file
    /// holds no addin metadata
    Completed { metadata: Option<ModuleMetadata> },
}

impl WorkerMessage {
    /// Encode as a single protocol line (no trailing newline)
    pub fn encode(&self) -> String {
        // Infallible for this enum shape
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a protocol line; `None` for anything that is not a message
    pub fn decode(line: &str) -> Option<WorkerMessage> {
        serde_json::from_str(line.trim()).ok()
    }
}
