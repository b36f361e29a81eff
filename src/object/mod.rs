//! content-addressed object store
//!
//! every object lives at `objects/<kind>/XX/YYYY...` where XXYYYY... is the
//! hex hash. writes are atomic (temp file, fsync, rename, fsync dir) and
//! deduplicated: an object that already exists is never rewritten.

pub mod blob;
pub mod commit;
pub mod tree;

pub use blob::{blob_exists, blob_path, read_blob, write_blob};
pub use commit::{commit_exists, commit_path, read_commit, write_commit};
pub use tree::{read_tree, tree_exists, tree_path, write_tree, EMPTY_TREE};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::Hash;
use crate::repo::Repo;

/// zstd level for every stored object
const COMPRESSION_LEVEL: i32 = 3;

/// fan-out path of an object under a kind directory
pub(crate) fn object_path(kind_dir: &Path, hash: &Hash) -> PathBuf {
    let (dir, file) = hash.to_path_components();
    kind_dir.join(dir).join(file)
}

pub(crate) fn compress(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, COMPRESSION_LEVEL).map_err(|e| Error::Io {
        path: PathBuf::from("<zstd>"),
        source: e,
    })
}

pub(crate) fn decompress(data: &[u8], path: &Path) -> Result<Vec<u8>> {
    zstd::decode_all(data).with_path(path)
}

/// read raw object bytes, mapping a missing file to `ObjectNotFound`
pub(crate) fn read_object_file(path: &Path, hash: &Hash) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ObjectNotFound(*hash)
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// store bytes under a precomputed hash unless already present
pub(crate) fn store_object(repo: &Repo, kind_dir: &Path, hash: &Hash, bytes: &[u8]) -> Result<()> {
    let path = object_path(kind_dir, hash);
    if path.exists() {
        return Ok(());
    }

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| kind_dir.to_path_buf());
    fs::create_dir_all(&dir).with_path(&dir)?;

    atomic_write(repo, &path, bytes)
}

/// write a file through the store's tmp directory
pub(crate) fn atomic_write(repo: &Repo, dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = repo.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        tmp_file.write_all(bytes).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    if let Err(e) = fs::rename(&tmp_path, dest) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Io {
            path: dest.to_path_buf(),
            source: e,
        });
    }

    if let Some(parent) = dest.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// serialize as cbor, compress, and store keyed by the hash of the compressed bytes
pub(crate) fn write_structured<T: Serialize>(repo: &Repo, kind_dir: &Path, value: &T) -> Result<Hash> {
    let mut cbor_bytes = Vec::new();
    ciborium::into_writer(value, &mut cbor_bytes)?;

    let compressed = compress(&cbor_bytes)?;
    let hash = Hash::digest(&compressed);

    store_object(repo, kind_dir, &hash, &compressed)?;
    Ok(hash)
}

/// load a structured object, verifying its hash before decoding
pub(crate) fn read_structured<T: DeserializeOwned>(kind_dir: &Path, hash: &Hash) -> Result<T> {
    let path = object_path(kind_dir, hash);
    let compressed = read_object_file(&path, hash)?;

    if Hash::digest(&compressed) != *hash {
        return Err(Error::CorruptObject(*hash));
    }

    let cbor_bytes = decompress(&compressed, &path)?;
    let value: T = ciborium::from_reader(&cbor_bytes[..])?;
    Ok(value)
}

fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
