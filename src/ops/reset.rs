use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};
use crate::exclude::{relative_str, ExclusionRuleSet};
use crate::hash::{compute_blob_hash, Hash, EXEC_MODE, FILE_MODE, SYMLINK_MODE};
use crate::object::{read_blob, read_tree};
use crate::repo::Repo;
use crate::types::EntryKind;

/// what a hard reset did to the live tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// files created or overwritten from the target
    pub written: usize,
    /// eligible live files absent from the target
    pub removed: usize,
    /// files already matching the target
    pub unchanged: usize,
}

/// make the eligible content of `root` exactly match a stored tree
///
/// live eligible files missing from the target are deleted, together with
/// any directory left empty by that. every file in the target is restored,
/// even if it would be excluded today. excluded live files the target does
/// not mention are left alone.
pub fn reset_to(repo: &Repo, root: &Path, rules: &ExclusionRuleSet, tree: &Hash) -> Result<ResetReport> {
    let _lock = repo.lock()?;

    let mut target = BTreeMap::new();
    flatten(repo, tree, "", &mut target)?;

    let mut report = ResetReport::default();
    let mut touched_dirs = BTreeSet::new();

    // pass 1: drop live files the target does not have
    for (rel, path) in live_leaves(root, rules) {
        if target.contains_key(&rel) {
            continue;
        }
        remove_path(&path)?;
        report.removed += 1;
        if let Some(parent) = path.parent() {
            touched_dirs.insert(parent.to_path_buf());
        }
    }

    // pass 2: write every target file that differs
    for (rel, kind) in &target {
        let dest = root.join(rel);
        if matches_live(&dest, kind) {
            report.unchanged += 1;
            continue;
        }
        restore(repo, root, &dest, kind)?;
        report.written += 1;
    }

    prune_empty_dirs(root, touched_dirs);

    tracing::debug!(
        written = report.written,
        removed = report.removed,
        unchanged = report.unchanged,
        "live tree reset"
    );
    Ok(report)
}

/// every file and symlink in a tree, keyed by relative path
fn flatten(repo: &Repo, tree: &Hash, prefix: &str, out: &mut BTreeMap<String, EntryKind>) -> Result<()> {
    let tree = read_tree(repo, tree)?;
    for entry in tree.entries() {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match &entry.kind {
            EntryKind::Directory { hash } => flatten(repo, hash, &path, out)?,
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
    Ok(())
}

/// eligible files and symlinks currently under root
///
/// mirrors what staging records: entries with non UTF-8 names (and anything
/// below them) and special files are never listed, and neither are regular
/// files whose content cannot be read.
fn live_leaves(root: &Path, rules: &ExclusionRuleSet) -> Vec<(String, PathBuf)> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() > 0 && entry.file_name().to_str().is_none() {
                return false;
            }
            match relative_str(root, entry.path()) {
                Some(rel) => !rules.excludes(&rel),
                None => true,
            }
        })
        .filter_map(|e| e.ok())
        .filter(|e| {
            let file_type = e.file_type();
            file_type.is_symlink() || (file_type.is_file() && fs::File::open(e.path()).is_ok())
        })
        .filter_map(|e| relative_str(root, e.path()).map(|rel| (rel, e.into_path())))
        .collect()
}

/// does the live path already hold exactly this entry
fn matches_live(path: &Path, kind: &EntryKind) -> bool {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return false;
    };

    match kind {
        EntryKind::File { hash, .. } => {
            if !meta.file_type().is_file() {
                return false;
            }
            let mode = if meta.permissions().mode() & 0o111 != 0 {
                EXEC_MODE
            } else {
                FILE_MODE
            };
            fs::read(path)
                .map(|content| compute_blob_hash(mode, &content) == *hash)
                .unwrap_or(false)
        }
        EntryKind::Symlink { hash, .. } => {
            meta.file_type().is_symlink()
                && fs::read_link(path)
                    .map(|t| compute_blob_hash(SYMLINK_MODE, t.as_os_str().as_bytes()) == *hash)
                    .unwrap_or(false)
        }
        EntryKind::Directory { .. } => false,
    }
}

fn restore(repo: &Repo, root: &Path, dest: &Path, kind: &EntryKind) -> Result<()> {
    clear_parents(root, dest)?;

    // whatever occupies the path now (wrong type, old content) goes away
    if fs::symlink_metadata(dest).is_ok() {
        remove_path(dest)?;
    }

    let content = read_blob(repo, kind.hash())?;
    match kind {
        EntryKind::File { executable, .. } => {
            fs::write(dest, &content).with_path(dest)?;
            let mode = if *executable { 0o755 } else { 0o644 };
            fs::set_permissions(dest, fs::Permissions::from_mode(mode)).with_path(dest)?;
        }
        EntryKind::Symlink { .. } => {
            let target = std::ffi::OsStr::from_bytes(&content);
            std::os::unix::fs::symlink(target, dest).with_path(dest)?;
        }
        EntryKind::Directory { .. } => {}
    }
    Ok(())
}

/// make sure every ancestor of `dest` below root is a real directory
fn clear_parents(root: &Path, dest: &Path) -> Result<()> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    let Ok(rel) = parent.strip_prefix(root) else {
        return Ok(());
    };

    let mut current = root.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => remove_path(&current)?,
            Err(_) => {}
        }
        fs::create_dir(&current).with_path(&current)?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path).with_path(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path).with_path(path)
    } else {
        fs::remove_file(path).with_path(path)
    }
}

/// remove directories emptied by deletions, walking up toward root
fn prune_empty_dirs(root: &Path, dirs: BTreeSet<PathBuf>) {
    // deepest first so children go before parents
    for dir in dirs.into_iter().rev() {
        let mut current = dir.as_path();
        while current != root && current.starts_with(root) {
            if fs::remove_dir(current).is_err() {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }
}
