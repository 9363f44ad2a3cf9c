use chrono::{SecondsFormat, Utc};
use std::path::Path;

/// Create a directory (and its parents) if it does not exist yet
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::debug!("Created directory {}", path.display());
    }
    Ok(())
}

/// Current time as an RFC 3339 UTC timestamp with fixed microsecond precision.
///
/// Fixed width keeps lexical order equal to chronological order, which the
/// `ORDER BY created_at` queries rely on.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
