//! async entry points
//!
//! operations on the same workspace run one at a time: each call takes a
//! per-workspace gate, then does its blocking work on tokio's blocking pool.
//! the engine is reopened for every call so nothing is cached between them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::Dispatch;

use crate::config::EngineConfig;
use crate::engine::{
    CheckpointCreated, CheckpointEngine, CheckpointListing, DiffReport, PruneOutcome,
    RollbackOutcome, StatusReport,
};
use crate::error::{Error, Result};
use crate::workspace::identity_of;

type Gate = Arc<Mutex<()>>;

fn gates() -> &'static std::sync::Mutex<HashMap<String, Gate>> {
    static GATES: OnceLock<std::sync::Mutex<HashMap<String, Gate>>> = OnceLock::new();
    GATES.get_or_init(|| std::sync::Mutex::new(HashMap::new()))
}

/// the gate shared by every caller working on `workspace`
fn gate_for(workspace: &Path) -> Gate {
    let canonical = std::fs::canonicalize(workspace).unwrap_or_else(|_| workspace.to_path_buf());
    let key = identity_of(&canonical);

    let mut gates = gates().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // a gate only the registry still holds has no caller waiting on it
    gates.retain(|_, gate| Arc::strong_count(gate) > 1);
    gates.entry(key).or_default().clone()
}

/// async checkpoint operations for one configured workspace
#[derive(Clone)]
pub struct Checkpoints {
    config: EngineConfig,
    dispatch: Dispatch,
}

impl Checkpoints {
    pub fn new(config: EngineConfig) -> Self {
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        Self::with_dispatch(config, dispatch)
    }

    pub fn with_dispatch(config: EngineConfig, dispatch: Dispatch) -> Self {
        Self { config, dispatch }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&CheckpointEngine) -> Result<T> + Send + 'static,
    {
        let gate = gate_for(&self.config.workspace);
        let _guard = gate.lock().await;

        let config = self.config.clone();
        let dispatch = self.dispatch.clone();
        tokio::task::spawn_blocking(move || {
            let engine = CheckpointEngine::open_with_dispatch(&config, dispatch)?;
            op(&engine)
        })
        .await
        .map_err(|e| Error::Task(e.to_string()))?
    }

    pub async fn create_checkpoint(&self, message: Option<String>) -> Result<CheckpointCreated> {
        self.run(move |engine| engine.create_checkpoint(message.as_deref()))
            .await
    }

    pub async fn list_checkpoints(&self, limit: Option<usize>) -> Result<Vec<CheckpointListing>> {
        self.run(move |engine| engine.list_checkpoints(limit)).await
    }

    /// never fails; problems opening the workspace are reported in the outcome
    pub async fn rollback(&self, checkpoint_id: String) -> RollbackOutcome {
        let id = checkpoint_id.clone();
        match self.run(move |engine| Ok(engine.rollback(&id))).await {
            Ok(outcome) => outcome,
            Err(e) => RollbackOutcome {
                success: false,
                files_restored: 0,
                message: e.to_string(),
                checkpoint_id,
            },
        }
    }

    pub async fn diff(&self, from_id: String, to_id: Option<String>) -> Result<DiffReport> {
        self.run(move |engine| engine.diff(&from_id, to_id.as_deref()))
            .await
    }

    pub async fn status(&self) -> Result<StatusReport> {
        self.run(|engine| engine.status()).await
    }

    pub async fn prune(&self, days: u32) -> Result<PruneOutcome> {
        self.run(move |engine| engine.prune(days)).await
    }
}
