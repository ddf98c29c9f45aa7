//! Append-only session log: one JSON-encoded `MemoryEntry` per line.
//!
//! Each session writes `<root>/<session_id>.jsonl`. Logs of other sessions
//! can be rotated into `<root>/archive/`. The format is human-inspectable
//! and replayed on open; corrupted lines are skipped, not fatal.

use chrono::Utc;
use ember_core::error::MemoryError;
use ember_core::memory::MemoryEntry;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File extension of session logs.
pub const LOG_EXTENSION: &str = "jsonl";

/// Name of the rotation directory under the storage root.
pub const ARCHIVE_DIR: &str = "archive";

/// The open log of the active session.
pub struct SessionLog {
    path: PathBuf,
    file: File,
}

impl SessionLog {
    /// Open (or create) the log for `session_id`, returning the entries
    /// already recorded in it.
    pub fn open(root: &Path, session_id: &str) -> Result<(Self, Vec<MemoryEntry>), MemoryError> {
        std::fs::create_dir_all(root).map_err(|e| {
            MemoryError::Io(format!("Failed to create storage root {}: {e}", root.display()))
        })?;

        let path = log_path(root, session_id);
        let entries = replay(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MemoryError::Io(format!("Failed to open {}: {e}", path.display())))?;

        debug!(path = %path.display(), count = entries.len(), "Session log opened");
        Ok((Self { path, file }, entries))
    }

    /// Append one entry and flush it to the OS.
    pub fn append(&mut self, entry: &MemoryEntry) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Format(format!("Failed to serialize memory entry: {e}")))?;
        line.push('\n');

        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| MemoryError::Io(format!("Failed to append to {}: {e}", self.path.display())))
    }

    /// Force buffered data to disk.
    pub fn sync(&mut self) -> Result<(), MemoryError> {
        self.file
            .sync_all()
            .map_err(|e| MemoryError::Io(format!("Failed to sync {}: {e}", self.path.display())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn log_path(root: &Path, session_id: &str) -> PathBuf {
    root.join(format!("{session_id}.{LOG_EXTENSION}"))
}

/// `session-<yyyymmdd-hhmmss>-<8 hex>`
pub fn generate_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session-{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Session ids become file names, so only a conservative alphabet is allowed.
pub fn validate_session_id(session_id: &str) -> Result<(), MemoryError> {
    let valid = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !session_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(MemoryError::InvalidArgument(format!(
            "session id '{session_id}' must be non-empty and use only [A-Za-z0-9._-]"
        )))
    }
}

fn replay(path: &Path) -> Result<Vec<MemoryEntry>, MemoryError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(MemoryError::Io(format!("Failed to read {}: {e}", path.display())));
        }
    };

    Ok(content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping corrupted session log line");
                None
            }
        })
        .collect())
}

/// Move every session log except `active_session` into `<root>/archive/`.
/// Returns how many logs were moved; a second call moves nothing.
pub fn archive_sessions(root: &Path, active_session: &str) -> Result<usize, MemoryError> {
    let archive = root.join(ARCHIVE_DIR);
    std::fs::create_dir_all(&archive).map_err(|e| {
        MemoryError::Io(format!("Failed to create archive directory {}: {e}", archive.display()))
    })?;

    let active = log_path(root, active_session);
    let dir = std::fs::read_dir(root)
        .map_err(|e| MemoryError::Io(format!("Failed to list {}: {e}", root.display())))?;

    let mut moved = 0;
    for item in dir {
        let item = item.map_err(|e| MemoryError::Io(format!("Failed to list {}: {e}", root.display())))?;
        let path = item.path();
        if !path.is_file() || path == active {
            continue;
        }
        if path.extension().is_none_or(|ext| ext != LOG_EXTENSION) {
            continue;
        }

        let Some(name) = path.file_name() else { continue };
        let target = unique_target(&archive, &name.to_string_lossy());
        std::fs::rename(&path, &target).map_err(|e| {
            MemoryError::Io(format!("Failed to archive {}: {e}", path.display()))
        })?;
        moved += 1;
    }

    if moved > 0 {
        info!(moved, archive = %archive.display(), "Archived inactive sessions");
    }
    Ok(moved)
}

/// Never overwrite an earlier archived log with the same name.
fn unique_target(archive: &Path, file_name: &str) -> PathBuf {
    let candidate = archive.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name.trim_end_matches(&format!(".{LOG_EXTENSION}"));
    (1..)
        .map(|n| archive.join(format!("{stem}-{n}.{LOG_EXTENSION}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
