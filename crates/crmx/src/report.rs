//! 🧾 End-of-run paperwork: the human summary and the machine failure manifest.
//!
//! - [`Summary`]: label/value rows rendered as a borderless comfy table, logged at `info`.
//! - [`FailureLog`]: every per-record failure, persisted as
//!   `failed_<kind>_<YYYYmmdd_HHMMSS>.json` when there was at least one.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::Result;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use serde::Serialize;
use tracing::{info, warn};

use crate::backends::snapshot::{timestamped_path, write_pretty};
use crate::error::{MANIFEST_ERROR_LIMIT, truncate_chars};

/// 📋 A titled list of outcome counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    title: String,
    rows: Vec<(String, String)>,
}

impl Summary {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, label: impl Into<String>, value: impl Display) -> Self {
        self.rows.push((label.into(), value.to_string()));
        self
    }

    /// ➕ Append several rows, e.g. a status distribution.
    pub fn rows<L: Into<String>, V: Display>(
        mut self,
        rows: impl IntoIterator<Item = (L, V)>,
    ) -> Self {
        self.rows
            .extend(rows.into_iter().map(|(label, value)| (label.into(), value.to_string())));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// 🔍 Value of the first row with this label. Tests lean on this.
    pub fn value(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(row_label, _)| row_label == label)
            .map(|(_, value)| value.as_str())
    }

    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        for (label, value) in &self.rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        format!("{}\n{}", self.title, table)
    }

    pub fn log(&self) {
        info!("\n{}", self.render());
    }
}

/// 📒 The failure manifest for one run. `T` is the per-pipeline entry shape.
#[derive(Debug, Clone)]
pub struct FailureLog<T> {
    kind: &'static str,
    entries: Vec<T>,
}

impl<T: Serialize> FailureLog<T> {
    /// `kind` lands in the file name: `failed_<kind>_...json`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 💾 Write the manifest into `dir`. Nothing failed → nothing written, `Ok(None)`.
    pub async fn persist(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let path = timestamped_path(dir, &format!("failed_{}", self.kind), "json");
        write_pretty(&path, &self.entries).await?;
        warn!(
            "📒 {} failed {} saved to {}",
            self.entries.len(),
            self.kind,
            path.display()
        );
        Ok(Some(path))
    }
}

/// ✂️ Error text as it goes into a manifest line.
pub(crate) fn manifest_error(err: &impl Display) -> String {
    truncate_chars(&err.to_string(), MANIFEST_ERROR_LIMIT)
}
