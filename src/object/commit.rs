use std::path::PathBuf;

use crate::error::Result;
use crate::hash::Hash;
use crate::object::{object_path, read_structured, write_structured};
use crate::repo::Repo;
use crate::types::Commit;

/// write a commit to the object store
pub fn write_commit(repo: &Repo, commit: &Commit) -> Result<Hash> {
    write_structured(repo, &repo.commits_path(), commit)
}

pub fn read_commit(repo: &Repo, hash: &Hash) -> Result<Commit> {
    read_structured(&repo.commits_path(), hash)
}

pub fn commit_path(repo: &Repo, hash: &Hash) -> PathBuf {
    object_path(&repo.commits_path(), hash)
}

pub fn commit_exists(repo: &Repo, hash: &Hash) -> bool {
    commit_path(repo, hash).exists()
}
