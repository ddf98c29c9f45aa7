//! Export to JSON / Markdown and import from the JSON export.

use chrono::{DateTime, Utc};
use ember_core::error::MemoryError;
use ember_core::memory::{
    CORRECTION_TAG, MemoryCategory, MemoryEntry, PATTERN_TAG, normalize_tags,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::store::MemoryStore;

const UNTAGGED: &str = "untagged";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(MemoryError::InvalidArgument(format!(
                "unknown export format '{other}' (expected json or markdown)"
            ))),
        }
    }
}

/// One element of the JSON export as accepted on import. Only `text` is
/// required; ids in the file are ignored.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    text: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_import_importance")]
    importance: f32,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    category: MemoryCategory,
    #[serde(default)]
    pinned: bool,
}

fn default_import_importance() -> f32 {
    0.5
}

impl MemoryStore {
    /// Write every entry to `path`. Returns the number of bytes written.
    pub fn export(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<usize, MemoryError> {
        let path = path.as_ref();
        let entries = self.entries();
        let body = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&entries)
                .map_err(|e| MemoryError::Format(format!("Failed to serialize export: {e}")))?,
            ExportFormat::Markdown => render_markdown(self.session_id(), &entries),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Io(format!("Failed to create {}: {e}", parent.display())))?;
        }
        std::fs::write(path, &body)
            .map_err(|e| MemoryError::Io(format!("Failed to write {}: {e}", path.display())))?;

        info!(path = %path.display(), ?format, entries = entries.len(), "Memory exported");
        Ok(body.len())
    }

    /// Load a JSON export into this session under fresh ids. Elements before
    /// a malformed one stay inserted.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<usize, MemoryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Io(format!("Failed to read {}: {e}", path.display())))?;
        let elements: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
            MemoryError::Format(format!("{} is not a JSON array of memories: {e}", path.display()))
        })?;

        let mut loaded = 0;
        for (n, element) in elements.into_iter().enumerate() {
            let record: ImportRecord = serde_json::from_value(element)
                .map_err(|e| MemoryError::Format(format!("element {n}: {e}")))?;

            let mut tags = record.tags;
            match record.category {
                MemoryCategory::Correction => tags.push(CORRECTION_TAG.to_string()),
                MemoryCategory::Pattern => tags.push(PATTERN_TAG.to_string()),
                MemoryCategory::Plain => {}
            }

            self.insert(
                &record.text,
                normalize_tags(&tags),
                record.importance,
                record.category,
                record.pinned,
                record.created_at.unwrap_or_else(Utc::now),
            )
            .map_err(|e| match e {
                MemoryError::InvalidArgument(msg) => MemoryError::Format(format!("element {n}: {msg}")),
                other => other,
            })?;
            loaded += 1;
        }

        info!(path = %path.display(), loaded, "Memory imported");
        Ok(loaded)
    }
}

fn render_markdown(session_id: &str, entries: &[&MemoryEntry]) -> String {
    let mut groups: BTreeMap<&str, Vec<&MemoryEntry>> = BTreeMap::new();
    for &entry in entries {
        if entry.tags.is_empty() {
            groups.entry(UNTAGGED).or_default().push(entry);
        }
        for tag in &entry.tags {
            groups.entry(tag.as_str()).or_default().push(entry);
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Memory export: {session_id}\n");
    let _ = writeln!(out, "{} entries\n", entries.len());
    for (tag, group) in groups {
        let _ = writeln!(out, "## {tag}\n");
        for entry in group {
            let pin = if entry.pinned { " [pinned]" } else { "" };
            let _ = writeln!(
                out,
                "- {} _(importance {:.2}){pin}_",
                entry.text.replace('\n', " "),
                entry.importance
            );
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchQuery;
    use crate::store::tests::{assert_indices_consistent, open_temp};

    #[test]
    fn parse_format() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("MD".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn json_export_then_import_into_fresh_session() {
        let (dir, mut store) = open_temp();
        store.add("User's name is Tim", &["personal"], 0.95, true).unwrap();
        store.add("Likes tea", &[] as &[&str], 0.4, false).unwrap();
        store.store_correction("Use metric units", None).unwrap();

        let path = dir.path().join("out/export.json");
        let bytes = store.export(&path, ExportFormat::Json).unwrap();
        assert!(bytes > 0);

        let mut other = MemoryStore::open(Some("fresh"), dir.path()).unwrap();
        other.add("Pre-existing", &["misc"], 0.5, false).unwrap();
        assert_eq!(other.import(&path).unwrap(), 3);
        assert_eq!(other.len(), 4);

        // fresh ids, continuing the target session's sequence
        let tim = other.search(&SearchQuery::text("tim"));
        assert_eq!(tim.hits[0].entry.id, 2);
        assert!(tim.hits[0].entry.pinned);
        assert_eq!(other.get_corrections(5).len(), 1);
        assert_indices_consistent(&other);
    }

    #[test]
    fn markdown_groups_by_tag() {
        let (dir, mut store) = open_temp();
        store.add("Quarterly report", &["work"], 0.8, false).unwrap();
        store.add("Call mom", &[] as &[&str], 0.7, false).unwrap();

        let path = dir.path().join("export.md");
        store.export(&path, ExportFormat::Markdown).unwrap();
        let md = std::fs::read_to_string(path).unwrap();
        assert!(md.contains("## work"));
        assert!(md.contains("## untagged"));
        assert!(md.contains("- Quarterly report _(importance 0.80)_"));
    }

    #[test]
    fn malformed_element_keeps_earlier_inserts() {
        let (dir, mut store) = open_temp();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"[{"text": "good one", "tags": ["a"]}, {"tags": ["missing text"]}, {"text": "never"}]"#,
        )
        .unwrap();

        let err = store.import(&path).unwrap_err();
        assert!(matches!(err, MemoryError::Format(_)));
        assert_eq!(store.len(), 1);
        assert_indices_consistent(&store);
    }

    #[test]
    fn non_array_is_format_error() {
        let (dir, mut store) = open_temp();
        let path = dir.path().join("object.json");
        std::fs::write(&path, r#"{"text": "not an array"}"#).unwrap();
        assert!(matches!(store.import(&path), Err(MemoryError::Format(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn out_of_range_importance_is_format_error() {
        let (dir, mut store) = open_temp();
        let path = dir.path().join("range.json");
        std::fs::write(&path, r#"[{"text": "too important", "importance": 4.0}]"#).unwrap();
        assert!(matches!(store.import(&path), Err(MemoryError::Format(_))));
    }
}
