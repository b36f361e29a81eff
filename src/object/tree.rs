use std::path::PathBuf;

use crate::error::Result;
use crate::hash::Hash;
use crate::object::{compress, object_path, read_structured, write_structured};
use crate::repo::Repo;
use crate::types::Tree;

/// hash of the tree with no entries, written when a store is created
pub static EMPTY_TREE: std::sync::LazyLock<Hash> = std::sync::LazyLock::new(|| {
    let mut cbor = Vec::new();
    ciborium::into_writer(&Tree::empty(), &mut cbor)
        .ok()
        .and_then(|()| compress(&cbor).ok())
        .map(|compressed| Hash::digest(&compressed))
        .unwrap_or(Hash::ZERO)
});

/// write a tree to the object store
///
/// trees are serialized as CBOR, then zstd compressed.
/// the hash is computed over the compressed bytes.
pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<Hash> {
    write_structured(repo, &repo.trees_path(), tree)
}

/// read a tree, failing with `CorruptObject` if the bytes do not match the hash
pub fn read_tree(repo: &Repo, hash: &Hash) -> Result<Tree> {
    read_structured(&repo.trees_path(), hash)
}

pub fn tree_path(repo: &Repo, hash: &Hash) -> PathBuf {
    object_path(&repo.trees_path(), hash)
}

pub fn tree_exists(repo: &Repo, hash: &Hash) -> bool {
    tree_path(repo, hash).exists()
}
