//! Durable per-user conversation history
//!
//! Each user's history lives in `{dir}/conversation_history_{user_id}.json`.
//! Saves write a temp file in the same directory, fsync it, then rename it
//! over the previous record, so a crash at any point leaves either the old or
//! the new history on disk and never a partial one.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{ConversationHistory, Message};
use crate::{Error, Result};

const FILE_PREFIX: &str = "conversation_history_";
const TEMP_PREFIX: &str = ".conversation_history_";

/// Record written to disk
#[derive(Serialize)]
struct RecordRef<'a> {
    user_id: &'a str,
    updated_at: DateTime<Utc>,
    messages: &'a ConversationHistory,
}

/// Any record layout accepted on load
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Current {
        #[allow(dead_code)]
        user_id: String,
        messages: ConversationHistory,
    },
    /// Older layout: a map of user id to messages
    Keyed(HashMap<String, Vec<Message>>),
}

/// Filesystem-backed conversation store
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Storage(format!(
                "failed to create history directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir })
    }

    /// Path of the record for a user
    #[must_use]
    pub fn record_path(&self, user_id: &str) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}.json", file_key(user_id)))
    }

    /// Load a user's history
    ///
    /// A missing record is the normal first run and yields an empty history.
    /// Unreadable or corrupt records are logged and also yield an empty
    /// history; the file is left in place until the next save replaces it.
    #[must_use]
    pub fn load(&self, user_id: &str) -> ConversationHistory {
        let path = self.record_path(user_id);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(user_id, "no previous conversation history, starting fresh");
                return ConversationHistory::new();
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    path = %path.display(),
                    error = %e,
                    "failed to read conversation history"
                );
                return ConversationHistory::new();
            }
        };

        match serde_json::from_str::<StoredRecord>(&content) {
            Ok(StoredRecord::Current { messages, .. }) => {
                tracing::info!(user_id, messages = messages.len(), "loaded conversation history");
                messages
            }
            Ok(StoredRecord::Keyed(mut users)) => {
                let messages: ConversationHistory =
                    users.remove(user_id).unwrap_or_default().into();
                tracing::info!(
                    user_id,
                    messages = messages.len(),
                    "loaded conversation history from legacy layout"
                );
                messages
            }
            Err(e) => {
                tracing::warn!(
                    user_id,
                    path = %path.display(),
                    error = %e,
                    "failed to parse conversation history, starting fresh"
                );
                ConversationHistory::new()
            }
        }
    }

    /// Persist a user's full history, replacing the previous record atomically
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the record cannot be written; the
    /// previously saved history is left intact
    pub fn save(&self, user_id: &str, history: &ConversationHistory) -> Result<()> {
        self.stage(user_id, history)?.commit()?;
        tracing::debug!(user_id, messages = history.len(), "conversation history saved");
        Ok(())
    }

    /// Write a user's history to a synced temp file without publishing it
    ///
    /// The previous record stays authoritative until [`StagedSave::commit`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if serialization or the temp write fails
    pub fn stage(&self, user_id: &str, history: &ConversationHistory) -> Result<StagedSave> {
        let record = RecordRef {
            user_id,
            updated_at: Utc::now(),
            messages: history,
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| Error::Storage(format!("failed to serialize history: {e}")))?;

        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::Storage(format!("failed to create temp file: {e}")))?;

        file.write_all(&json)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| {
                Error::Storage(format!(
                    "failed to write temp file {}: {e}",
                    file.path().display()
                ))
            })?;

        Ok(StagedSave {
            file,
            target: self.record_path(user_id),
        })
    }

    /// Delete a user's record
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the record exists but cannot be removed
    pub fn clear(&self, user_id: &str) -> Result<()> {
        let path = self.record_path(user_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(user_id, "conversation history cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

/// A fully written temp record awaiting its atomic rename
#[derive(Debug)]
pub struct StagedSave {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedSave {
    /// Path of the temp file holding the new record
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically replace the user's record with the staged one
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the rename fails
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.file.persist(&target).map_err(|e| {
            Error::Storage(format!(
                "failed to replace {}: {}",
                target.display(),
                e.error
            ))
        })?;
        Ok(())
    }
}

/// File-name-safe form of a user id
fn file_key(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
