//! rewind - shadow snapshot history for agent workspaces
//!
//! records the eligible files of a working directory into a private,
//! content-addressed history, then lists, diffs and rolls back to those
//! points without touching any version control state the directory already has.
//!
//! # Core concepts
//!
//! - **Workspace**: a validated tracked root and its fixed-width identity
//! - **Snapshot**: a commit in the shadow history (root tree + parent)
//! - **Checkpoint**: a user-facing record pointing at one snapshot
//! - **Exclusion rules**: decide which paths are eligible for tracking
//!
//! # Storage layout
//!
//! ```text
//! <storage_root>/<identity>/
//!     rewind-index.json      checkpoint records
//!     index.lock
//!     snapshots/
//!         config.toml
//!         objects/{blobs,trees,commits}/XX/YYYY...
//!         refs/head
//! ```
//!
//! blob hash = SHA256(mode | content); trees and commits are CBOR + zstd,
//! hashed over the compressed bytes.
//!
//! # Example usage
//!
//! ```no_run
//! use rewind::{CheckpointEngine, EngineConfig};
//!
//! let config = EngineConfig::new("/path/to/project");
//! let engine = CheckpointEngine::open(&config).unwrap();
//!
//! let created = engine.create_checkpoint(Some("before refactor")).unwrap();
//! // ... edit files ...
//! let report = engine.diff(&created.checkpoint_id, None).unwrap();
//! println!("{} files changed", report.total_files);
//!
//! let outcome = engine.rollback(&created.checkpoint_id);
//! assert!(outcome.success);
//! ```

mod config;
mod engine;
mod error;
mod hash;
mod index;
mod object;
mod presenter;
mod refs;
mod repo;
mod service;
mod store;
mod workspace;

pub mod exclude;
pub mod ops;
pub mod types;

pub use config::{default_storage_root, EngineConfig, StoreConfig, STORE_FORMAT_VERSION};
pub use engine::{
    CheckpointCreated, CheckpointEngine, CheckpointListing, DiffReport, PruneOutcome,
    RollbackOutcome, StatusReport,
};
pub use error::{Error, Result};
pub use exclude::{is_excluded, ExclusionRuleSet, Rule};
pub use hash::{compute_blob_hash, Hash};
pub use index::{CheckpointIndex, CheckpointRecord};
pub use object::{read_blob, read_commit, read_tree, EMPTY_TREE};
pub use presenter::{classify, is_binary, present, preview, DiffChange, PreviewLimits, BINARY_PLACEHOLDER};
pub use repo::Repo;
pub use service::Checkpoints;
pub use store::SnapshotStore;
pub use types::{ChangeKind, Commit, EntryKind, FileDiff, Tree, TreeEntry};
pub use workspace::{identity_of, protected_directories, Workspace};
