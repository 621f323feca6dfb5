//! External metadata extraction.

use serde_json::Value as JsonValue;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Capability for pulling structured metadata out of a file.
///
/// Extraction failure is a recognized input state rather than an error: a
/// file without extractable metadata is treated by the catalog as missing.
pub trait MetadataExtractor {
    fn extract(&self, path: &Path) -> Option<JsonValue>;
}

/// Shells out to `exiftool -n -json`.
pub struct ExiftoolExtractor;

impl MetadataExtractor for ExiftoolExtractor {
    fn extract(&self, path: &Path) -> Option<JsonValue> {
        let output = match Command::new("exiftool")
            .args(["-n", "-json"])
            .arg(path)
            .output()
        {
            Ok(output) => output,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to run exiftool");
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                path = %path.display(),
                status = %output.status,
                "exiftool returned non-zero status"
            );
            return None;
        }

        let mut entries: Vec<JsonValue> = match serde_json::from_slice(&output.stdout) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), %err, "unparseable exiftool output");
                return None;
            }
        };

        if entries.is_empty() {
            return None;
        }
        Some(entries.remove(0))
    }
}
