use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Write the readiness marker: the startup time as an RFC 3339 UTC timestamp.
pub async fn write_ready_marker(path: &Path, now: DateTime<Utc>) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    tokio::fs::write(path, now.to_rfc3339_opts(SecondsFormat::Secs, true))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
