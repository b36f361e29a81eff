use std::path::PathBuf;

use crate::Hash;

/// error type for rewind operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid workspace {path}: {reason}")]
    InvalidWorkspace { path: PathBuf, reason: String },

    #[error("refusing to track protected directory: {0}")]
    ProtectedDirectory(PathBuf),

    #[error("snapshot backend unavailable at {path}: {reason}")]
    BackendUnavailable { path: PathBuf, reason: String },

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("checkpoint index is locked by another writer: {0}")]
    IndexWriteConflict(PathBuf),

    #[error("corrupt checkpoint index at {path}: {message}")]
    CorruptIndex { path: PathBuf, message: String },

    #[error("failed to create checkpoint: {0}")]
    CreateCheckpoint(#[source] Box<Error>),

    #[error("snapshot store is in use by another operation")]
    LockContention,

    #[error("snapshot not found: {0}")]
    RefNotFound(String),

    #[error("ambiguous snapshot ref: {0}")]
    AmbiguousRef(String),

    #[error("invalid snapshot ref: {0}")]
    InvalidRef(String),

    #[error("object not found: {0}")]
    ObjectNotFound(Hash),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(Hash),

    #[error("invalid tree entry name: {0}")]
    InvalidEntryName(String),

    #[error("duplicate tree entry name: {0}")]
    DuplicateEntryName(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    /// build a backend error from anything displayable
    pub fn backend(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::BackendUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// innermost error, looking through checkpoint-creation context
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::CreateCheckpoint(inner) => inner.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
