use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{Hash, EXEC_MODE, FILE_MODE, SYMLINK_MODE};

/// a directory tree - collection of entries sorted by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// create a new tree, validating and sorting entries
    pub fn new(mut entries: Vec<TreeEntry>) -> Result<Self> {
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }

        // byte-wise order keeps the serialized form stable
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        for window in entries.windows(2) {
            if window[0].name == window[1].name {
                return Err(Error::DuplicateEntryName(window[0].name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// create an empty tree
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// get entries slice
    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// look up entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// is tree empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".to_string()));
    }
    if name.contains('/') {
        return Err(Error::InvalidEntryName(format!(
            "name contains '/': {}",
            name
        )));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName(format!(
            "name contains null byte: {}",
            name
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidEntryName(format!("reserved name: {}", name)));
    }
    Ok(())
}

/// a single entry in a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// kind of tree entry
///
/// only content the workspace owns is recorded: regular files, symlinks and
/// the directories that contain them. empty directories never appear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    /// regular file
    File {
        hash: Hash,
        size: u64,
        executable: bool,
    },

    /// symbolic link, blob holds the target
    Symlink { hash: Hash, size: u64 },

    /// subdirectory, hash points at another tree
    Directory { hash: Hash },
}

impl EntryKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntryKind::File { .. } => "file",
            EntryKind::Symlink { .. } => "symlink",
            EntryKind::Directory { .. } => "directory",
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, EntryKind::Directory { .. })
    }

    /// object hash (blob for files and symlinks, tree for directories)
    pub fn hash(&self) -> &Hash {
        match self {
            EntryKind::File { hash, .. } => hash,
            EntryKind::Symlink { hash, .. } => hash,
            EntryKind::Directory { hash } => hash,
        }
    }

    /// logical size of the entry content, zero for directories
    pub fn size(&self) -> u64 {
        match self {
            EntryKind::File { size, .. } | EntryKind::Symlink { size, .. } => *size,
            EntryKind::Directory { .. } => 0,
        }
    }

    /// mode used when hashing the entry content
    pub fn mode(&self) -> u32 {
        match self {
            EntryKind::File {
                executable: true, ..
            } => EXEC_MODE,
            EntryKind::File { .. } => FILE_MODE,
            EntryKind::Symlink { .. } => SYMLINK_MODE,
            EntryKind::Directory { .. } => 0o040000,
        }
    }

    pub fn file(hash: Hash, size: u64, executable: bool) -> Self {
        Self::File {
            hash,
            size,
            executable,
        }
    }

    pub fn symlink(hash: Hash, size: u64) -> Self {
        Self::Symlink { hash, size }
    }

    pub fn directory(hash: Hash) -> Self {
        Self::Directory { hash }
    }
}
