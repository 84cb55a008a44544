//! Recent prompts, persisted between sessions
//!
//! Stored as a JSON array in ~/.local/state/titan/history.json, newest first,
//! capped at [`HISTORY_CAP`] entries with at most one entry per prompt.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::{ResponseResult, PREVIEW_CHARS};
use crate::config::{self, write_atomic};
use crate::routes::Task;

pub const HISTORY_CAP: usize = 10;

/// One completed send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
    pub prompt: String,
    pub status: Option<u16>,
    pub ok: bool,
    pub preview: String,
    pub raw: Value,
}

impl HistoryItem {
    pub fn new(prompt: &str, task: Task, result: &ResponseResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            task,
            prompt: prompt.to_string(),
            status: result.status,
            ok: result.ok,
            preview: result.preview(PREVIEW_CHARS),
            raw: result.body.clone(),
        }
    }
}

/// Insert newest-first, dropping an older entry with the same prompt and
/// anything beyond the cap
pub fn insert(items: &mut Vec<HistoryItem>, item: HistoryItem) {
    items.retain(|existing| existing.prompt != item.prompt);
    items.insert(0, item);
    items.truncate(HISTORY_CAP);
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Store at the default XDG location
    pub fn open() -> Result<Self> {
        Ok(Self::at(config::history_path()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read persisted history; anything unreadable yields an empty list
    pub fn load(&self) -> Vec<HistoryItem> {
        if !self.path.exists() {
            return vec![];
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read history at {:?}: {}", self.path, err);
                return vec![];
            }
        };

        match serde_json::from_str::<Vec<HistoryItem>>(&content) {
            Ok(mut items) => {
                items.truncate(HISTORY_CAP);
                items
            }
            Err(err) => {
                tracing::warn!("Failed to parse history at {:?}: {}", self.path, err);
                vec![]
            }
        }
    }

    /// Insert into the stored list and write it back
    pub fn record(&self, item: HistoryItem) -> Vec<HistoryItem> {
        let mut items = self.load();
        insert(&mut items, item);
        self.save(&items);
        items
    }

    pub fn remove(&self, id: &str) -> Vec<HistoryItem> {
        let mut items = self.load();
        items.retain(|item| item.id != id);
        self.save(&items);
        items
    }

    pub fn clear(&self) {
        self.save(&[]);
    }

    /// Replace the stored list. Write failures are logged, not propagated
    pub fn save(&self, items: &[HistoryItem]) {
        let written = serde_json::to_string_pretty(items)
            .map_err(anyhow::Error::from)
            .and_then(|content| write_atomic(&self.path, &content));

        if let Err(err) = written {
            tracing::warn!("Failed to save history at {:?}: {:#}", self.path, err);
        }
    }
}
