// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Metadata write history for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::formatter::MetadataUpdate;
use crate::Result;

/// One metadata write to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub album_key: String,
    pub image_key: String,
    pub file_name: String,
    pub previous_caption: Option<String>,
    pub previous_keywords: Vec<String>,
    pub new_caption: String,
    pub new_keywords: Vec<String>,
    pub undone: bool,
}

impl HistoryEntry {
    /// The update that puts the image back the way it was
    pub fn restore_update(&self) -> MetadataUpdate {
        MetadataUpdate {
            caption: self.previous_caption.clone().unwrap_or_default(),
            keywords: self.previous_keywords.clone(),
        }
    }
}

/// History manager for tracking metadata writes
pub struct History {
    path: PathBuf,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all history entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Mark an entry as undone
    pub fn mark_undone(&self, id: &str) -> Result<()> {
        let entries = self.read_all()?;

        // Rewrite the entire file with the updated entry
        let file = File::create(&self.path)?;
        let mut writer = std::io::BufWriter::new(file);

        for mut entry in entries {
            if entry.id == id {
                entry.undone = true;
            }
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Entries that haven't been undone, newest first
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().rev().filter(|e| !e.undone).collect())
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Create a new history entry for a write of `update` over the previous metadata
pub fn create_entry(
    album_key: &str,
    image_key: &str,
    file_name: &str,
    previous_caption: Option<String>,
    previous_keywords: Vec<String>,
    update: &MetadataUpdate,
) -> HistoryEntry {
    HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        album_key: album_key.to_string(),
        image_key: image_key.to_string(),
        file_name: file_name.to_string(),
        previous_caption,
        previous_keywords,
        new_caption: update.caption.clone(),
        new_keywords: update.keywords.clone(),
        undone: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(image_key: &str) -> HistoryEntry {
        let update = MetadataUpdate {
            caption: "New caption.".into(),
            keywords: vec!["beach".into(), "smugvision".into()],
        };
        create_entry("album", image_key, "IMG.JPG", Some("Old".into()), vec!["beach".into()], &update)
    }

    #[test]
    fn test_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("nested").join("history.jsonl"));
        assert!(history.read_all().unwrap().is_empty());

        history.append(&entry("a")).unwrap();
        history.append(&entry("b")).unwrap();

        let recent = history.get_recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].image_key, "b");
        assert_eq!(history.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_mark_undone() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        let first = entry("a");
        history.append(&first).unwrap();
        history.append(&entry("b")).unwrap();

        history.mark_undone(&first.id).unwrap();
        let undoable = history.get_undoable().unwrap();
        assert_eq!(undoable.len(), 1);
        assert_eq!(undoable[0].image_key, "b");
    }

    #[test]
    fn test_restore_update() {
        let restore = entry("a").restore_update();
        assert_eq!(restore.caption, "Old");
        assert_eq!(restore.keywords, vec!["beach"]);
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();
        let history = History::new(path);
        history.append(&entry("a")).unwrap();
        assert_eq!(history.read_all().unwrap().len(), 1);
        history.clear().unwrap();
        assert!(!history.path().exists());
    }
}
