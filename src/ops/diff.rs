use crate::error::Result;
use crate::hash::Hash;
use crate::object::{read_blob, read_tree};
use crate::repo::Repo;
use crate::types::{BlobRef, ChangeKind, EntryKind, FileDiff, PathChange, Tree};

/// compare two root trees and return every changed file path
///
/// only files and symlinks are reported, directories are descended into.
/// identical subtrees are skipped without being read. the result is sorted
/// by path bytes.
pub fn diff_trees(repo: &Repo, from: &Hash, to: &Hash) -> Result<Vec<PathChange>> {
    let mut changes = Vec::new();
    diff_subtrees(repo, from, to, "", &mut changes)?;
    changes.sort_by(|a, b| a.path.as_bytes().cmp(b.path.as_bytes()));
    Ok(changes)
}

/// number of changed paths between two root trees, without reading file content
pub fn count_changes(repo: &Repo, from: &Hash, to: &Hash) -> Result<usize> {
    Ok(diff_trees(repo, from, to)?.len())
}

fn diff_subtrees(
    repo: &Repo,
    from: &Hash,
    to: &Hash,
    prefix: &str,
    changes: &mut Vec<PathChange>,
) -> Result<()> {
    if from == to {
        return Ok(());
    }

    let t1 = read_tree(repo, from)?;
    let t2 = read_tree(repo, to)?;

    let mut names: Vec<&str> = t1
        .entries()
        .iter()
        .chain(t2.entries())
        .map(|e| e.name.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();

    for name in names {
        let path = join(prefix, name);

        match (t1.get(name).map(|e| &e.kind), t2.get(name).map(|e| &e.kind)) {
            (None, Some(added)) => report_side(repo, added, &path, ChangeKind::Added, changes)?,
            (Some(deleted), None) => {
                report_side(repo, deleted, &path, ChangeKind::Deleted, changes)?
            }
            (Some(EntryKind::Directory { hash: h1 }), Some(EntryKind::Directory { hash: h2 })) => {
                diff_subtrees(repo, h1, h2, &path, changes)?
            }
            (Some(before), Some(after)) if before.is_directory() || after.is_directory() => {
                // a file replaced by a directory or the reverse
                report_side(repo, before, &path, ChangeKind::Deleted, changes)?;
                report_side(repo, after, &path, ChangeKind::Added, changes)?;
            }
            (Some(before), Some(after)) => {
                // blob hashes cover the mode, so an exec bit flip shows up here too
                if before.hash() != after.hash() {
                    changes.push(PathChange {
                        path,
                        kind: ChangeKind::Modified,
                        before: Some(blob_ref(before)),
                        after: Some(blob_ref(after)),
                    });
                }
            }
            (None, None) => {}
        }
    }

    Ok(())
}

/// report an entry that exists on one side only, expanding directories
fn report_side(
    repo: &Repo,
    kind: &EntryKind,
    path: &str,
    change: ChangeKind,
    changes: &mut Vec<PathChange>,
) -> Result<()> {
    if let EntryKind::Directory { hash } = kind {
        let subtree = read_tree(repo, hash)?;
        return report_tree(repo, &subtree, path, change, changes);
    }

    let side = Some(blob_ref(kind));
    let (before, after) = match change {
        ChangeKind::Added => (None, side),
        _ => (side, None),
    };
    changes.push(PathChange {
        path: path.to_string(),
        kind: change,
        before,
        after,
    });
    Ok(())
}

fn report_tree(
    repo: &Repo,
    tree: &Tree,
    prefix: &str,
    change: ChangeKind,
    changes: &mut Vec<PathChange>,
) -> Result<()> {
    for entry in tree.entries() {
        report_side(repo, &entry.kind, &join(prefix, &entry.name), change, changes)?;
    }
    Ok(())
}

fn blob_ref(kind: &EntryKind) -> BlobRef {
    BlobRef {
        hash: *kind.hash(),
        size: kind.size(),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// lazy, one-shot sequence of file diffs
///
/// blob content for each change is only read when the item is pulled.
pub struct FileDiffs<'a> {
    repo: &'a Repo,
    changes: std::vec::IntoIter<PathChange>,
}

impl<'a> FileDiffs<'a> {
    pub fn new(repo: &'a Repo, changes: Vec<PathChange>) -> Self {
        Self {
            repo,
            changes: changes.into_iter(),
        }
    }

    fn load(&self, side: Option<BlobRef>) -> Result<Option<Vec<u8>>> {
        side.map(|blob| read_blob(self.repo, &blob.hash)).transpose()
    }
}

impl Iterator for FileDiffs<'_> {
    type Item = Result<FileDiff>;

    fn next(&mut self) -> Option<Self::Item> {
        let change = self.changes.next()?;
        let diff = self.load(change.before).and_then(|before| {
            let after = self.load(change.after)?;
            Ok(FileDiff {
                path: change.path,
                before,
                after,
            })
        });
        Some(diff)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.changes.size_hint()
    }
}

impl ExactSizeIterator for FileDiffs<'_> {}
