//! 💾 Snapshots and manifests: JSON on disk, so a run can be replayed, audited, or retried.
//!
//! - Exports are written compact (they get big: tens of thousands of invoices).
//! - Failure manifests are written pretty, because a human is going to read them.
//! - Run artifacts are named `<prefix>_<YYYYmmdd_HHMMSS>.<ext>` in the artifacts dir.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// 🏷️ `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.<extension>`, local time.
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}_{stamp}.{extension}"))
}

/// 📤 Write `records` as compact JSON. Returns the byte count.
pub async fn write_snapshot<T: Serialize + ?Sized>(path: &Path, records: &T) -> Result<u64> {
    let bytes = serde_json::to_vec(records).context("💀 Snapshot refused to serialize")?;
    write_bytes(path, &bytes).await?;
    Ok(bytes.len() as u64)
}

/// 📝 Write `records` as indented JSON.
pub async fn write_pretty<T: Serialize + ?Sized>(path: &Path, records: &T) -> Result<()> {
    let bytes =
        serde_json::to_vec_pretty(records).context("💀 Manifest refused to serialize")?;
    write_bytes(path, &bytes).await
}

/// 📥 Read a snapshot back.
pub async fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.with_context(|| {
        format!(
            "💀 Couldn't read snapshot '{}'. Did the export finish? Is the path right?",
            path.display()
        )
    })?;
    serde_json::from_slice(&bytes).with_context(|| {
        format!(
            "💀 Snapshot '{}' isn't the JSON list we wrote. Was it truncated or hand-edited?",
            path.display()
        )
    })
}

async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("💀 Couldn't create directory '{}'", parent.display()))?;
    }
    let file = File::create(path)
        .await
        .with_context(|| format!("💀 Couldn't create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .await
        .with_context(|| format!("💀 Couldn't write '{}'", path.display()))?;
    writer
        .flush()
        .await
        .with_context(|| format!("💀 Couldn't flush '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn the_one_where_an_export_survives_the_trip_to_disk() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let path = dir.path().join("nested").join("invoices_export.json");
        let invoices = vec![json!({"id": 1, "number": "INV-1"}), json!({"id": 2})];

        let written = write_snapshot(&path, &invoices).await.expect("💀 write");
        let read_back: Vec<Value> = read_snapshot(&path).await.expect("💀 read");

        assert_eq!(read_back, invoices);
        assert_eq!(
            written,
            std::fs::metadata(&path).expect("💀 metadata").len()
        );
    }

    #[tokio::test]
    async fn the_one_where_a_truncated_snapshot_is_called_out() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{\"id\": 1},").expect("💀 write");

        let err = read_snapshot::<Vec<Value>>(&path)
            .await
            .expect_err("💀 half a list is not a list");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn the_one_where_artifacts_carry_a_timestamp() {
        let path = timestamped_path(Path::new("/tmp/runs"), "failed_invoices", "json");
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("💀 file name");
        assert!(name.starts_with("failed_invoices_"));
        assert!(name.ends_with(".json"));
        // -- failed_invoices_ + YYYYmmdd_HHMMSS + .json
        assert_eq!(name.len(), "failed_invoices_".len() + 15 + ".json".len());
    }
}
