use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::hash::Hash;
use crate::object::read_commit;
use crate::refs::read_head;
use crate::repo::Repo;
use crate::types::Commit;

/// commit with its hash for log output
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub hash: Hash,
    pub commit: Commit,
}

impl LogEntry {
    pub fn time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.commit.timestamp)
    }
}

/// snapshot history from head, newest first, at most `max_count` entries
pub fn log(repo: &Repo, max_count: usize) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let mut next = read_head(repo)?;

    while let Some(hash) = next {
        if entries.len() >= max_count {
            break;
        }
        let commit = read_commit(repo, &hash)?;
        next = commit.parent;
        entries.push(LogEntry { hash, commit });
    }

    Ok(entries)
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.hash.short(), self.time().to_rfc3339())?;
        if !self.commit.message.is_empty() {
            write!(f, " {}", self.commit.message)?;
        }
        Ok(())
    }
}
