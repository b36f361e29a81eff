mod change;
mod commit;
mod tree;

pub use change::{BlobRef, ChangeKind, FileDiff, PathChange};
pub use commit::Commit;
pub use tree::{EntryKind, Tree, TreeEntry};
