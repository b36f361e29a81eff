use std::fs;

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::object::{atomic_write, commit_exists};
use crate::repo::Repo;

/// shortest accepted abbreviated snapshot hash
pub const MIN_PREFIX_LEN: usize = 7;

/// newest snapshot, `None` before the first one
pub fn read_head(repo: &Repo) -> Result<Option<Hash>> {
    let path = repo.head_path();
    match fs::read_to_string(&path) {
        Ok(content) => Ok(Some(Hash::from_hex(content.trim())?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io { path, source: e }),
    }
}

/// move head to a snapshot
pub fn write_head(repo: &Repo, hash: &Hash) -> Result<()> {
    atomic_write(repo, &repo.head_path(), format!("{}\n", hash.to_hex()).as_bytes())
}

/// resolve a snapshot reference to a stored commit hash
///
/// accepts the full 64-character hex hash or a unique prefix of at least
/// [`MIN_PREFIX_LEN`] characters.
pub fn resolve(repo: &Repo, input: &str) -> Result<Hash> {
    let input = input.trim().to_ascii_lowercase();

    if input.len() < MIN_PREFIX_LEN || input.len() > 64 || !input.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::InvalidRef(input));
    }

    if input.len() == 64 {
        let hash = Hash::from_hex(&input)?;
        if !commit_exists(repo, &hash) {
            return Err(Error::RefNotFound(input));
        }
        return Ok(hash);
    }

    let mut matches = find_by_prefix(repo, &input)?;
    match matches.len() {
        0 => Err(Error::RefNotFound(input)),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::AmbiguousRef(input)),
    }
}

/// every stored commit whose hex hash starts with `prefix`
fn find_by_prefix(repo: &Repo, prefix: &str) -> Result<Vec<Hash>> {
    let fan_dir = repo.commits_path().join(&prefix[..2]);
    let rest = &prefix[2..];

    let entries = match fs::read_dir(&fan_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::Io {
                path: fan_dir,
                source: e,
            })
        }
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Io {
            path: fan_dir.clone(),
            source: e,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(rest) {
            if let Ok(hash) = Hash::from_hex(&format!("{}{}", &prefix[..2], name)) {
                out.push(hash);
            }
        }
    }
    Ok(out)
}
