//! Append-only audit log of sync mutations
//!
//! Layout of the audit directory:
//!
//! ```text
//! <audit_dir>/
//!   index.jsonl         one SyncEntry per sync that changed something
//!   <sync_id>.jsonl     the SyncAuditRecords of that sync
//! ```
//!
//! Every append takes an exclusive `fs2` lock on the file it writes, every
//! read a shared one. Lines are never rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deck_store::{EntityKind, EntityRecord, record_id};
use serde_json::Value;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::apply::ApplyResult;
use crate::diff::Operation;
use crate::error::{Error, Result};
use crate::sync::Direction;

const INDEX_FILE: &str = "index.jsonl";

/// One mutation performed by a sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAuditRecord {
    pub sync_id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub entity_type: EntityKind,
    /// Identity key of the entity
    pub entity_name: String,
    pub entity_id: Option<String>,
    pub action: Operation,
    pub before_state: Option<EntityRecord>,
    pub after_state: Option<EntityRecord>,
}

/// Index line describing one sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub sync_id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Sync this one rolled back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,
}

/// Audit log rooted at one directory
#[derive(Debug, Clone)]
pub struct SyncAuditLog {
    dir: PathBuf,
}

impl SyncAuditLog {
    /// Open a log; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location under the user's data directory
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("decksync").join("audit"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Records file of a sync; ids that are not UUIDs never map to a file
    fn records_path(&self, sync_id: &str) -> Result<PathBuf> {
        let id = Uuid::parse_str(sync_id).map_err(|_| Error::SyncNotFound {
            sync_id: sync_id.to_string(),
        })?;
        Ok(self.dir.join(format!("{}.jsonl", id.hyphenated())))
    }

    /// Start recording a new sync under a fresh id
    pub fn begin(&self, direction: Direction, rollback_of: Option<String>) -> AuditSession<'_> {
        AuditSession {
            log: self,
            entry: SyncEntry {
                sync_id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                direction,
                rollback_of,
            },
            recorded: 0,
        }
    }

    /// Every sync in the order it was recorded
    pub fn entries(&self) -> Result<Vec<SyncEntry>> {
        read_lines(&self.index_path())
    }

    pub fn entry(&self, sync_id: &str) -> Result<Option<SyncEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.sync_id == sync_id))
    }

    /// Records of one sync in the order they were written
    pub fn records(&self, sync_id: &str) -> Result<Vec<SyncAuditRecord>> {
        let path = self.records_path(sync_id)?;
        if !path.exists() {
            return Err(Error::SyncNotFound {
                sync_id: sync_id.to_string(),
            });
        }
        read_lines(&path)
    }

    /// Records of every sync indexed after `sync_id`
    pub fn records_after(&self, sync_id: &str) -> Result<Vec<SyncAuditRecord>> {
        let entries = self.entries()?;
        let Some(position) = entries.iter().position(|e| e.sync_id == sync_id) else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for entry in &entries[position + 1..] {
            match self.records(&entry.sync_id) {
                Ok(later) => records.extend(later),
                Err(Error::SyncNotFound { .. }) => {
                    tracing::warn!("Index lists {} but its records are missing", entry.sync_id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn append<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.lock_exclusive()?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        FileExt::unlock(&file)?;
        written?;
        Ok(())
    }
}

/// Records the mutations of one sync
///
/// The index entry is written together with the first record, so syncs that
/// changed nothing leave no trace.
#[derive(Debug)]
pub struct AuditSession<'a> {
    log: &'a SyncAuditLog,
    entry: SyncEntry,
    recorded: usize,
}

impl AuditSession<'_> {
    pub fn sync_id(&self) -> &str {
        &self.entry.sync_id
    }

    pub fn entry(&self) -> &SyncEntry {
        &self.entry
    }

    /// Number of records written so far
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn record(
        &mut self,
        entity_type: EntityKind,
        entity_name: &str,
        entity_id: Option<String>,
        action: Operation,
        before_state: Option<EntityRecord>,
        after_state: Option<EntityRecord>,
    ) -> Result<()> {
        if self.recorded == 0 {
            self.log.append(&self.log.index_path(), &self.entry)?;
        }
        let record = SyncAuditRecord {
            sync_id: self.entry.sync_id.clone(),
            timestamp: Utc::now(),
            direction: self.entry.direction,
            entity_type,
            entity_name: entity_name.to_string(),
            entity_id,
            action,
            before_state,
            after_state,
        };
        let path = self.log.records_path(&self.entry.sync_id)?;
        self.log.append(&path, &record)?;
        self.recorded += 1;
        tracing::debug!(
            "Audited {} {} '{}' in {}",
            action,
            entity_type.singular(),
            entity_name,
            self.entry.sync_id
        );
        Ok(())
    }
}

impl AuditSession<'_> {
    /// Record a successful apply row
    ///
    /// The after-state is the desired document carrying the id the store
    /// assigned, so it compares cleanly against a later export.
    pub fn record_result(&mut self, result: &ApplyResult) -> Result<()> {
        let diff = &result.diff;
        let entity_id = result
            .applied
            .as_ref()
            .and_then(record_id)
            .or_else(|| diff.current.as_ref().and_then(record_id))
            .or_else(|| diff.desired.as_ref().and_then(record_id))
            .map(str::to_string);
        let after = diff.desired.clone().map(|mut state| {
            if let Some(id) = &entity_id {
                state.insert("id".to_string(), Value::String(id.clone()));
            }
            state
        });
        self.record(
            diff.entity_kind,
            &diff.key,
            entity_id,
            diff.operation,
            diff.current.clone(),
            after,
        )
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;

    let mut items = Vec::new();
    for (number, line) in BufReader::new(&file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| Error::Audit {
            message: format!("{}:{}: {}", path.display(), number + 1, e),
        })?;
        items.push(item);
    }
    FileExt::unlock(&file)?;
    Ok(items)
}
