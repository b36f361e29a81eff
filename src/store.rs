//! the shadow history of one workspace
//!
//! `SnapshotStore` ties a [`Repo`] to the workspace it records. the user's
//! own version control metadata is excluded by the default rules and never
//! read or written, so it cannot interfere with staging or reset.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::exclude::{relative_str, ExclusionRuleSet};
use crate::hash::Hash;
use crate::object::{read_commit, EMPTY_TREE};
use crate::ops::{self, FileDiffs, LogEntry, ResetReport, SnapshotOutcome};
use crate::refs;
use crate::repo::Repo;
use crate::workspace::Workspace;

pub struct SnapshotStore {
    repo: Repo,
    workspace: Workspace,
    rules_file: Option<PathBuf>,
    /// directories of engine state that must never be staged or reset
    state_dirs: Vec<PathBuf>,
}

impl SnapshotStore {
    /// open the store at `path`, creating it on first use
    pub fn init(path: &Path, workspace: &Workspace, rules_file: Option<&Path>) -> Result<Self> {
        let repo = Repo::open_or_init(path, workspace)?;
        Ok(Self {
            state_dirs: vec![repo.path().to_path_buf()],
            repo,
            workspace: workspace.clone(),
            rules_file: rules_file.map(Path::to_path_buf),
        })
    }

    /// also keep `dir` out of the history when it sits under the workspace
    pub fn with_state_dir(mut self, dir: &Path) -> Self {
        self.state_dirs.push(dir.to_path_buf());
        self
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// exclusion rules as they stand right now
    ///
    /// recomputed on each call since marker files under the root can change
    /// between operations.
    pub fn rules(&self) -> Result<ExclusionRuleSet> {
        ExclusionRuleSet::load_reserving(
            self.workspace.path(),
            self.rules_file.as_deref(),
            &self.reserved_paths(),
        )
    }

    /// state directories as paths relative to the workspace root
    fn reserved_paths(&self) -> Vec<String> {
        self.state_dirs
            .iter()
            .filter_map(|dir| {
                let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.clone());
                relative_str(self.workspace.path(), &dir)
            })
            .collect()
    }

    /// stage the live tree and advance head to a new snapshot
    pub fn create_snapshot(&self, message: &str) -> Result<SnapshotOutcome> {
        let rules = self.rules()?;
        ops::create_snapshot(&self.repo, self.workspace.path(), &rules, message)
    }

    /// changed files between a snapshot and another snapshot or the live tree
    ///
    /// [`Hash::ZERO`] stands for the empty snapshot on either side.
    pub fn diff(&self, from: &Hash, to: Option<&Hash>) -> Result<FileDiffs<'_>> {
        let (from_tree, to_tree) = self.tree_pair(from, to)?;
        let changes = ops::diff_trees(&self.repo, &from_tree, &to_tree)?;
        Ok(FileDiffs::new(&self.repo, changes))
    }

    /// how many paths [`SnapshotStore::diff`] would yield, without reading content
    pub fn diff_count(&self, from: &Hash, to: Option<&Hash>) -> Result<usize> {
        let (from_tree, to_tree) = self.tree_pair(from, to)?;
        ops::count_changes(&self.repo, &from_tree, &to_tree)
    }

    /// hard reset the live tree to a snapshot
    pub fn reset_to(&self, target: &Hash) -> Result<ResetReport> {
        let tree = self.tree_of(target)?;
        let rules = self.rules()?;
        ops::reset_to(&self.repo, self.workspace.path(), &rules, &tree)
    }

    /// history from head, newest first
    pub fn log(&self, max_count: usize) -> Result<Vec<LogEntry>> {
        ops::log(&self.repo, max_count)
    }

    pub fn head(&self) -> Result<Option<Hash>> {
        refs::read_head(&self.repo)
    }

    /// full hash or unique prefix to a snapshot hash
    pub fn resolve(&self, input: &str) -> Result<Hash> {
        refs::resolve(&self.repo, input)
    }

    fn tree_pair(&self, from: &Hash, to: Option<&Hash>) -> Result<(Hash, Hash)> {
        let from_tree = self.tree_of(from)?;
        let to_tree = match to {
            Some(to) => self.tree_of(to)?,
            None => self.live_tree()?,
        };
        Ok((from_tree, to_tree))
    }

    /// stage the live tree so untracked eligible files are visible
    fn live_tree(&self) -> Result<Hash> {
        let rules = self.rules()?;
        let (tree, _) = ops::stage(&self.repo, self.workspace.path(), &rules)?;
        Ok(tree)
    }

    fn tree_of(&self, snapshot: &Hash) -> Result<Hash> {
        if *snapshot == Hash::ZERO {
            return Ok(*EMPTY_TREE);
        }
        Ok(read_commit(&self.repo, snapshot)?.tree)
    }
}
