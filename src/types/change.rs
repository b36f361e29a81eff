use serde::{Deserialize, Serialize};

use crate::hash::Hash;

/// how a single path changed between two points
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// pointer to stored content for one side of a change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobRef {
    pub hash: Hash,
    pub size: u64,
}

/// a changed path as found by comparing trees, without content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathChange {
    pub path: String,
    pub kind: ChangeKind,
    pub before: Option<BlobRef>,
    pub after: Option<BlobRef>,
}

impl std::fmt::Display for PathChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// a changed path with both sides materialized
///
/// `None` means the path does not exist on that side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

impl FileDiff {
    /// content before the change, empty when the path did not exist
    pub fn before_bytes(&self) -> &[u8] {
        self.before.as_deref().unwrap_or_default()
    }

    /// content after the change, empty when the path no longer exists
    pub fn after_bytes(&self) -> &[u8] {
        self.after.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_display() {
        assert_eq!(ChangeKind::Added.to_string(), "added");
        assert_eq!(ChangeKind::Modified.to_string(), "modified");
        assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
    }

    #[test]
    fn test_change_kind_serde() {
        let json = serde_json::to_string(&ChangeKind::Modified).unwrap();
        assert_eq!(json, "\"modified\"");
    }

    #[test]
    fn test_missing_side_reads_empty() {
        let diff = FileDiff {
            path: "b.txt".to_string(),
            before: None,
            after: Some(b"new".to_vec()),
        };
        assert!(diff.before_bytes().is_empty());
        assert_eq!(diff.after_bytes(), b"new");
    }
}
