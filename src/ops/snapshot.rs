use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::Result;
use crate::exclude::ExclusionRuleSet;
use crate::hash::{Hash, EXEC_MODE, FILE_MODE, SYMLINK_MODE};
use crate::object::{write_blob, write_commit, write_tree, EMPTY_TREE};
use crate::refs::{read_head, write_head};
use crate::repo::Repo;
use crate::types::{Commit, EntryKind, Tree, TreeEntry};

/// one path that could not be staged
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingFailure {
    pub path: String,
    pub message: String,
}

/// outcome of staging the live tree
#[derive(Clone, Debug, Default)]
pub struct StagingReport {
    /// files and symlinks recorded
    pub files: usize,
    pub failures: Vec<StagingFailure>,
}

impl StagingReport {
    fn fail(&mut self, path: &str, message: impl std::fmt::Display) {
        tracing::warn!(path, error = %message, "skipping unreadable path");
        self.failures.push(StagingFailure {
            path: path.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// a created snapshot
#[derive(Clone, Debug)]
pub struct SnapshotOutcome {
    pub commit: Hash,
    pub tree: Hash,
    pub parent: Option<Hash>,
    pub report: StagingReport,
}

/// write every eligible file under `root` into the store and return the root tree
///
/// files that cannot be read are skipped and recorded in the report. failing
/// to write into the store is fatal.
pub fn stage(repo: &Repo, root: &Path, rules: &ExclusionRuleSet) -> Result<(Hash, StagingReport)> {
    let mut report = StagingReport::default();

    let tree = match stage_dir(repo, root, "", rules, &mut report)? {
        Some(hash) => hash,
        None => *EMPTY_TREE,
    };

    Ok((tree, report))
}

/// stage the live tree and commit it on top of head
pub fn create_snapshot(
    repo: &Repo,
    root: &Path,
    rules: &ExclusionRuleSet,
    message: &str,
) -> Result<SnapshotOutcome> {
    let _lock = repo.lock()?;

    let (tree, report) = stage(repo, root, rules)?;
    let parent = read_head(repo)?;

    let commit = write_commit(repo, &Commit::new(tree, parent, message))?;
    write_head(repo, &commit)?;

    tracing::debug!(
        snapshot = %commit.short(),
        files = report.files,
        skipped = report.failures.len(),
        "snapshot created"
    );

    Ok(SnapshotOutcome {
        commit,
        tree,
        parent,
        report,
    })
}

/// stage one directory, `None` when nothing eligible is inside
fn stage_dir(
    repo: &Repo,
    dir: &Path,
    prefix: &str,
    rules: &ExclusionRuleSet,
    report: &mut StagingReport,
) -> Result<Option<Hash>> {
    let mut dir_entries: Vec<_> = match fs::read_dir(dir) {
        Ok(iter) => iter.filter_map(|e| e.ok()).collect(),
        Err(e) => {
            report.fail(if prefix.is_empty() { "." } else { prefix }, e);
            return Ok(None);
        }
    };
    dir_entries.sort_by(|a, b| a.file_name().as_bytes().cmp(b.file_name().as_bytes()));

    let mut entries = Vec::new();

    for entry in dir_entries {
        let path = entry.path();
        let file_name = entry.file_name();
        let logical_path = if prefix.is_empty() {
            file_name.to_string_lossy().into_owned()
        } else {
            format!("{}/{}", prefix, file_name.to_string_lossy())
        };

        let Some(name) = file_name.to_str() else {
            report.fail(&logical_path, "file name is not valid UTF-8");
            continue;
        };

        if rules.excludes(&logical_path) {
            continue;
        }

        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                report.fail(&logical_path, e);
                continue;
            }
        };
        let file_type = meta.file_type();

        let kind = if file_type.is_file() {
            let content = match fs::read(&path) {
                Ok(content) => content,
                Err(e) => {
                    report.fail(&logical_path, e);
                    continue;
                }
            };
            let executable = meta.permissions().mode() & 0o111 != 0;
            let mode = if executable { EXEC_MODE } else { FILE_MODE };
            let hash = write_blob(repo, &content, mode)?;
            report.files += 1;
            EntryKind::file(hash, content.len() as u64, executable)
        } else if file_type.is_symlink() {
            // stored as the link target, never followed
            let target = match fs::read_link(&path) {
                Ok(target) => target,
                Err(e) => {
                    report.fail(&logical_path, e);
                    continue;
                }
            };
            let bytes = target.as_os_str().as_bytes();
            let hash = write_blob(repo, bytes, SYMLINK_MODE)?;
            report.files += 1;
            EntryKind::symlink(hash, bytes.len() as u64)
        } else if file_type.is_dir() {
            match stage_dir(repo, &path, &logical_path, rules, report)? {
                Some(hash) => EntryKind::directory(hash),
                None => continue,
            }
        } else {
            tracing::debug!(path = %logical_path, "skipping special file");
            continue;
        };

        entries.push(TreeEntry::new(name, kind));
    }

    if entries.is_empty() {
        return Ok(None);
    }

    let tree = Tree::new(entries)?;
    write_tree(repo, &tree).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{read_blob, read_commit, read_tree};
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Repo, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("store")).unwrap();
        let root = dir.path().join("ws");
        fs::create_dir(&root).unwrap();
        (dir, repo, root)
    }

    #[test]
    fn test_stage_single_file() {
        let (_dir, repo, root) = setup();
        fs::write(root.join("hello.txt"), "world").unwrap();

        let (hash, report) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        assert_eq!(report.files, 1);
        assert!(report.is_complete());

        let tree = read_tree(&repo, &hash).unwrap();
        let entry = tree.get("hello.txt").unwrap();
        assert_eq!(read_blob(&repo, entry.kind.hash()).unwrap(), b"world");
        assert_eq!(entry.kind.size(), 5);
    }

    #[test]
    fn test_stage_empty_root_is_empty_tree() {
        let (_dir, repo, root) = setup();
        fs::create_dir(root.join("empty")).unwrap();

        let (hash, report) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        assert_eq!(hash, *EMPTY_TREE);
        assert_eq!(report.files, 0);
    }

    #[test]
    fn test_stage_is_content_addressed() {
        let (_dir, repo, root) = setup();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/b/file.txt"), "deep").unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();

        let rules = ExclusionRuleSet::defaults();
        let (first, _) = stage(&repo, &root, &rules).unwrap();
        let (second, _) = stage(&repo, &root, &rules).unwrap();
        assert_eq!(first, second);

        fs::write(root.join("top.txt"), "changed").unwrap();
        let (third, _) = stage(&repo, &root, &rules).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_stage_skips_excluded() {
        let (_dir, repo, root) = setup();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(root.join(".env"), "SECRET=1").unwrap();
        fs::write(root.join("main.rs"), "fn main() {}").unwrap();

        let (hash, report) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        let tree = read_tree(&repo, &hash).unwrap();

        assert_eq!(report.files, 1);
        assert_eq!(tree.len(), 1);
        assert!(tree.get("main.rs").is_some());
    }

    #[test]
    fn test_stage_records_executable_bit() {
        let (_dir, repo, root) = setup();
        fs::write(root.join("run.sh"), "#!/bin/sh\n").unwrap();
        fs::set_permissions(root.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();

        let (hash, _) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        let tree = read_tree(&repo, &hash).unwrap();
        assert!(matches!(
            tree.get("run.sh").unwrap().kind,
            EntryKind::File { executable: true, .. }
        ));
    }

    #[test]
    fn test_stage_symlink_not_followed() {
        let (_dir, repo, root) = setup();
        symlink("/etc/passwd", root.join("link")).unwrap();

        let (hash, _) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        let tree = read_tree(&repo, &hash).unwrap();

        let entry = tree.get("link").unwrap();
        assert!(matches!(entry.kind, EntryKind::Symlink { .. }));
        assert_eq!(read_blob(&repo, entry.kind.hash()).unwrap(), b"/etc/passwd");
    }

    #[test]
    fn test_unreadable_file_is_partial_failure() {
        let (_dir, repo, root) = setup();
        fs::write(root.join("ok.txt"), "fine").unwrap();
        fs::write(root.join("locked.txt"), "secret").unwrap();
        fs::set_permissions(root.join("locked.txt"), fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits, nothing to observe there
        if fs::read(root.join("locked.txt")).is_ok() {
            return;
        }

        let (hash, report) = stage(&repo, &root, &ExclusionRuleSet::defaults()).unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "locked.txt");

        let tree = read_tree(&repo, &hash).unwrap();
        assert!(tree.get("ok.txt").is_some());
        assert!(tree.get("locked.txt").is_none());
    }

    #[test]
    fn test_create_snapshot_chains_parents() {
        let (_dir, repo, root) = setup();
        fs::write(root.join("file.txt"), "v1").unwrap();
        let rules = ExclusionRuleSet::defaults();

        let first = create_snapshot(&repo, &root, &rules, "v1").unwrap();
        assert_eq!(first.parent, None);

        fs::write(root.join("file.txt"), "v2").unwrap();
        let second = create_snapshot(&repo, &root, &rules, "v2").unwrap();
        assert_eq!(second.parent, Some(first.commit));

        let commit = read_commit(&repo, &second.commit).unwrap();
        assert_eq!(commit.parent, Some(first.commit));
        assert_eq!(commit.message, "v2");
        assert_eq!(read_head(&repo).unwrap(), Some(second.commit));
    }

    #[test]
    fn test_unchanged_snapshot_gets_new_ref() {
        let (_dir, repo, root) = setup();
        fs::write(root.join("file.txt"), "same").unwrap();
        let rules = ExclusionRuleSet::defaults();

        let first = create_snapshot(&repo, &root, &rules, "").unwrap();
        let second = create_snapshot(&repo, &root, &rules, "").unwrap();

        assert_eq!(first.tree, second.tree);
        assert_ne!(first.commit, second.commit);
    }
}
