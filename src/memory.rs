/*
 * @file memory.rs
 * @brief Long-term JSON memory store
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Long-term memory persisted as a single JSON object on disk.
//!
//! Every access reloads the whole file and every mutation rewrites it, so the
//! file is always the single source of truth. There is no locking; one
//! process owns the file for the lifetime of a session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::warn;

/// Sentence used in the system prompt when nothing has been remembered yet.
pub const NO_MEMORIES: &str = "No long-term memories found.";

/// Key-value memory backed by one JSON file.
///
/// # Details
/// Values are JSON scalars (normally strings written by the
/// `save_to_memory` tool). Insertion order is preserved so the rendered
/// snapshot reads in the order facts were learned.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    /// Opens the store, creating an empty JSON object file if none exists.
    ///
    /// # Arguments
    /// * `path` - Location of the memory file.
    ///
    /// # Returns
    /// * `Ok(MemoryStore)` - Store bound to `path`.
    ///
    /// # Errors
    /// Returns an error if the missing file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if !store.path.exists() {
            store.write_all(&Map::new())?;
        }
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `value` under `key`, overwriting any previous value.
    ///
    /// # Details
    /// Loads the full map, sets the key, and writes the full map back.
    /// Overwrites are silent; the last write wins.
    ///
    /// # Arguments
    /// * `key` - Name of the fact (e.g. `"favorite_color"`).
    /// * `value` - The fact itself.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.into());
        self.write_all(&entries)
    }

    /// Looks up a single value.
    ///
    /// # Returns
    /// * `Some(Value)` - The stored value.
    /// * `None` - The key was never saved.
    pub fn load(&self, key: &str) -> Option<Value> {
        self.entries().remove(key)
    }

    /// Returns the full map as it is currently on disk.
    ///
    /// # Details
    /// A missing, unreadable, or corrupt file yields an empty map. The
    /// problem is logged for operators but never surfaced to the user.
    pub fn entries(&self) -> Map<String, Value> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Map::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "memory file unreadable, treating as empty");
                return Map::new();
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "memory file corrupt, treating as empty");
                Map::new()
            }
        }
    }

    /// Renders the memory as prompt text.
    ///
    /// # Returns
    /// One `- key: value` line per entry in insertion order, or
    /// [`NO_MEMORIES`] when the store is empty.
    pub fn render_as_text(&self) -> String {
        let entries = self.entries();
        if entries.is_empty() {
            return NO_MEMORIES.to_string();
        }
        entries
            .iter()
            .map(|(key, value)| format!("- {}: {}", key, display_value(value)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .with_context(|| format!("Failed to serialize {}", self.path.display()))?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// Formats a stored value for humans: strings without quotes, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
