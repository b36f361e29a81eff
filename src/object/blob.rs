use std::path::PathBuf;

use crate::error::Result;
use crate::hash::{compute_blob_hash, Hash};
use crate::object::{compress, decompress, object_path, read_object_file, store_object};
use crate::repo::Repo;

/// write file content to the object store
///
/// the hash covers the mode and the raw content, the stored bytes are zstd
/// compressed. identical content with the same mode is stored once.
pub fn write_blob(repo: &Repo, content: &[u8], mode: u32) -> Result<Hash> {
    let hash = compute_blob_hash(mode, content);

    // dedup before paying for compression
    if blob_exists(repo, &hash) {
        return Ok(hash);
    }

    let compressed = compress(content)?;
    store_object(repo, &repo.blobs_path(), &hash, &compressed)?;
    Ok(hash)
}

/// get the filesystem path to a blob
pub fn blob_path(repo: &Repo, hash: &Hash) -> PathBuf {
    object_path(&repo.blobs_path(), hash)
}

/// check if a blob exists in the object store
pub fn blob_exists(repo: &Repo, hash: &Hash) -> bool {
    blob_path(repo, hash).exists()
}

/// read and decompress blob content
pub fn read_blob(repo: &Repo, hash: &Hash) -> Result<Vec<u8>> {
    let path = blob_path(repo, hash);
    let compressed = read_object_file(&path, hash)?;
    decompress(&compressed, &path)
}
