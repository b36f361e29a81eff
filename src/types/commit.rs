use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// a snapshot object: a root tree plus its place in the shadow history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// root tree hash
    pub tree: Hash,
    /// previous snapshot in the chain
    pub parent: Option<Hash>,
    /// unix timestamp in nanoseconds
    pub timestamp: i64,
    pub message: String,
}

impl Commit {
    /// create a new commit stamped with the current time
    pub fn new(tree: Hash, parent: Option<Hash>, message: impl Into<String>) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self::with_timestamp(tree, parent, timestamp, message)
    }

    /// create a new commit with explicit timestamp
    pub fn with_timestamp(
        tree: Hash,
        parent: Option<Hash>,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parent,
            timestamp,
            message: message.into(),
        }
    }

    /// is this the first snapshot of its chain
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
