//! checkpoint operations over one workspace
//!
//! [`CheckpointEngine`] composes the workspace resolver, the snapshot store
//! and the checkpoint index. every public operation runs under the engine's
//! own tracing dispatcher, so callers choose where its logs go.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Dispatch;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::index::{CheckpointIndex, CheckpointRecord};
use crate::presenter::{present, DiffChange, PreviewLimits};
use crate::store::SnapshotStore;
use crate::workspace::Workspace;

/// directory under a workspace's storage dir that holds the snapshot store
const SNAPSHOT_DIR: &str = "snapshots";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointCreated {
    pub checkpoint_id: String,
    pub timestamp: DateTime<Utc>,
    pub files_changed: u64,
    pub snapshot_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointListing {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub files_changed: u64,
    /// abbreviated snapshot hash
    pub snapshot_ref: String,
}

impl From<&CheckpointRecord> for CheckpointListing {
    fn from(record: &CheckpointRecord) -> Self {
        Self {
            id: record.id.clone(),
            timestamp: record.timestamp,
            message: record.message.clone(),
            files_changed: record.files_changed,
            snapshot_ref: record.snapshot_ref.short(),
        }
    }
}

/// result of a rollback, failures included
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    pub files_restored: u64,
    pub message: String,
    pub checkpoint_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub from_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    pub total_files: usize,
    pub changes: Vec<DiffChange>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_checkpoint: Option<CheckpointRecord>,
    pub total_checkpoints: usize,
    pub workspace_identity: String,
    pub workspace_path: PathBuf,
    pub storage_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneOutcome {
    pub removed: usize,
    pub remaining: usize,
}

pub struct CheckpointEngine {
    workspace: Workspace,
    storage_dir: PathBuf,
    store: SnapshotStore,
    index: CheckpointIndex,
    limits: PreviewLimits,
    list_limit: usize,
    dispatch: Dispatch,
}

impl CheckpointEngine {
    /// open the engine for the configured workspace, logging to the current dispatcher
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        Self::open_with_dispatch(config, dispatch)
    }

    /// open the engine with an explicit log sink
    ///
    /// the workspace is validated before anything is written, so a rejected
    /// root leaves no storage behind.
    pub fn open_with_dispatch(config: &EngineConfig, dispatch: Dispatch) -> Result<Self> {
        tracing::dispatcher::with_default(&dispatch, || {
            let workspace = Workspace::resolve(&config.workspace)?;
            let storage_dir = config.storage_dir_for(workspace.identity());

            let store = SnapshotStore::init(
                &storage_dir.join(SNAPSHOT_DIR),
                &workspace,
                config.rules_file.as_deref(),
            )?
            .with_state_dir(&storage_dir);
            let index = CheckpointIndex::new(&storage_dir);

            tracing::debug!(
                identity = workspace.identity(),
                path = %workspace.path().display(),
                "checkpoint engine ready"
            );

            Ok(Self {
                workspace,
                storage_dir,
                store,
                index,
                limits: PreviewLimits {
                    lines: config.preview_lines,
                    chars: config.preview_chars,
                },
                list_limit: config.list_limit,
                dispatch: dispatch.clone(),
            })
        })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn index(&self) -> &CheckpointIndex {
        &self.index
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let _span =
                tracing::info_span!("checkpoint", identity = self.workspace.identity()).entered();
            f()
        })
    }

    /// snapshot the workspace and record a checkpoint
    ///
    /// the change count is taken against the previous checkpoint's snapshot,
    /// which is read before the new snapshot exists. nothing is recorded if
    /// any step fails.
    pub fn create_checkpoint(&self, message: Option<&str>) -> Result<CheckpointCreated> {
        self.scoped(|| {
            self.try_create(message).map_err(|e| {
                tracing::error!(error = %e, "checkpoint creation failed");
                Error::CreateCheckpoint(Box::new(e))
            })
        })
    }

    fn try_create(&self, message: Option<&str>) -> Result<CheckpointCreated> {
        let previous = self.index.latest()?;

        let snapshot = self.store.create_snapshot(message.unwrap_or_default())?;

        let files_changed = match &previous {
            Some(prev) if prev.snapshot_ref == snapshot.commit => 0,
            Some(prev) => self
                .store
                .diff_count(&prev.snapshot_ref, Some(&snapshot.commit))?,
            None => self.store.diff_count(&Hash::ZERO, Some(&snapshot.commit))?,
        };

        let record = CheckpointRecord::new(
            message.map(str::to_string),
            snapshot.commit,
            files_changed as u64,
        );
        let created = CheckpointCreated {
            checkpoint_id: record.id.clone(),
            timestamp: record.timestamp,
            files_changed: record.files_changed,
            snapshot_ref: record.snapshot_ref.to_hex(),
        };
        self.index.append(record)?;

        tracing::info!(
            checkpoint = %created.checkpoint_id,
            snapshot = %snapshot.commit.short(),
            files = files_changed,
            skipped = snapshot.report.failures.len(),
            "checkpoint created"
        );
        Ok(created)
    }

    /// checkpoints newest first, at most `limit` (the configured default if `None`)
    pub fn list_checkpoints(&self, limit: Option<usize>) -> Result<Vec<CheckpointListing>> {
        self.scoped(|| {
            let records = self.index.list_descending()?;
            Ok(records
                .iter()
                .take(limit.unwrap_or(self.list_limit))
                .map(CheckpointListing::from)
                .collect())
        })
    }

    /// hard reset the workspace to a checkpoint
    ///
    /// failures come back as an unsuccessful outcome, never as an error.
    /// later checkpoints stay in the index.
    pub fn rollback(&self, checkpoint_id: &str) -> RollbackOutcome {
        self.scoped(|| match self.try_rollback(checkpoint_id) {
            Ok(files_restored) => {
                tracing::info!(checkpoint = checkpoint_id, files = files_restored, "rolled back");
                RollbackOutcome {
                    success: true,
                    files_restored,
                    message: format!("Rolled back to checkpoint {}", checkpoint_id),
                    checkpoint_id: checkpoint_id.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(checkpoint = checkpoint_id, error = %e, "rollback failed");
                RollbackOutcome {
                    success: false,
                    files_restored: 0,
                    message: e.to_string(),
                    checkpoint_id: checkpoint_id.to_string(),
                }
            }
        })
    }

    fn try_rollback(&self, checkpoint_id: &str) -> Result<u64> {
        let target = self.record(checkpoint_id)?;
        let latest = self.index.latest()?;

        // reported only, the reset happens regardless
        let files_restored = match &latest {
            Some(latest) if latest.id != target.id => self
                .store
                .diff_count(&target.snapshot_ref, Some(&latest.snapshot_ref))?,
            _ => 0,
        };

        self.store.reset_to(&target.snapshot_ref)?;
        Ok(files_restored as u64)
    }

    /// file changes from one checkpoint to another, or to the live workspace
    pub fn diff(&self, from_id: &str, to_id: Option<&str>) -> Result<DiffReport> {
        self.scoped(|| {
            let from = self.record(from_id)?;
            let to = to_id.map(|id| self.record(id)).transpose()?;

            let diffs = self
                .store
                .diff(&from.snapshot_ref, to.as_ref().map(|r| &r.snapshot_ref))?;

            let mut changes = Vec::with_capacity(diffs.len());
            for file_diff in diffs {
                if let Some(change) = present(&file_diff?, self.limits) {
                    changes.push(change);
                }
            }

            tracing::debug!(from = from_id, to = ?to_id, files = changes.len(), "diff computed");
            Ok(DiffReport {
                from_id: from.id,
                to_id: to.map(|r| r.id),
                total_files: changes.len(),
                changes,
            })
        })
    }

    pub fn status(&self) -> Result<StatusReport> {
        self.scoped(|| {
            let records = self.index.list_descending()?;
            Ok(StatusReport {
                total_checkpoints: records.len(),
                current_checkpoint: records.into_iter().next(),
                workspace_identity: self.workspace.identity().to_string(),
                workspace_path: self.workspace.path().to_path_buf(),
                storage_path: self.storage_dir.clone(),
            })
        })
    }

    /// forget checkpoints older than `days`; snapshots are kept
    pub fn prune(&self, days: u32) -> Result<PruneOutcome> {
        self.scoped(|| {
            let removed = self.index.prune_older_than(days)?;
            let remaining = self.index.load()?.len();
            tracing::info!(removed, remaining, days, "pruned checkpoint index");
            Ok(PruneOutcome { removed, remaining })
        })
    }

    /// checkpoint id for an id or a snapshot ref
    ///
    /// a snapshot ref (full or a unique prefix, as shown by listings) picks the
    /// newest checkpoint pointing at that snapshot.
    pub fn checkpoint_id(&self, input: &str) -> Result<String> {
        if self.index.get(input)?.is_some() {
            return Ok(input.to_string());
        }

        let snapshot = match self.store.resolve(input) {
            Ok(hash) => hash,
            Err(Error::AmbiguousRef(r)) => return Err(Error::AmbiguousRef(r)),
            Err(_) => return Err(Error::CheckpointNotFound(input.to_string())),
        };
        self.index
            .list_descending()?
            .into_iter()
            .find(|record| record.snapshot_ref == snapshot)
            .map(|record| record.id)
            .ok_or_else(|| Error::CheckpointNotFound(input.to_string()))
    }

    fn record(&self, id: &str) -> Result<CheckpointRecord> {
        self.index
            .get(id)?
            .ok_or_else(|| Error::CheckpointNotFound(id.to_string()))
    }
}
