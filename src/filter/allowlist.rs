//! Package allowlist files
//!
//! One package name per line. Surrounding whitespace is trimmed, blank
//! lines and `#` comments are ignored.

use std::path::Path;

use tracing::debug;

use crate::error::SyncError;
use crate::models::NameSet;

/// Parse allowlist text into a set of package names
pub fn parse_list(content: &str) -> NameSet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Read and parse an allowlist file
pub async fn load_list(path: &Path) -> Result<NameSet, SyncError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SyncError::Allowlist {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let names = parse_list(&content);
    debug!(path = %path.display(), count = names.len(), "Loaded allowlist");
    Ok(names)
}
