//! tracked root validation and identity derivation

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// number of decimal digits in a workspace identity
pub const IDENTITY_WIDTH: usize = 13;

/// folders under the home directory that are never tracked
const PROTECTED_SUBDIRS: &[&str] = &["Desktop", "Documents", "Downloads"];

/// a validated tracked root and the identity its storage is keyed by
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    path: PathBuf,
    identity: String,
}

impl Workspace {
    /// canonicalize and validate a requested root
    pub fn resolve(requested: &Path) -> Result<Self> {
        let home = dirs::home_dir();
        Self::resolve_with_home(requested, home.as_deref())
    }

    /// like [`Workspace::resolve`] with an explicit home directory
    pub fn resolve_with_home(requested: &Path, home: Option<&Path>) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidWorkspace {
            path: requested.to_path_buf(),
            reason,
        };

        let path = fs::canonicalize(requested).map_err(|e| invalid(e.to_string()))?;

        let meta = fs::metadata(&path).map_err(|e| invalid(e.to_string()))?;
        if !meta.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }

        // readability: listing must work before anything gets staged
        fs::read_dir(&path).map_err(|e| invalid(e.to_string()))?;

        if let Some(home) = home {
            if protected_directories(home).iter().any(|p| *p == path) {
                return Err(Error::ProtectedDirectory(path));
            }
        }

        let identity = identity_of(&path);
        Ok(Self { path, identity })
    }

    /// canonical absolute path of the tracked root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// fixed-width identity string
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// exact paths that can never be a tracked root
pub fn protected_directories(home: &Path) -> Vec<PathBuf> {
    let home = fs::canonicalize(home).unwrap_or_else(|_| home.to_path_buf());
    let mut out = vec![home.clone()];
    for sub in PROTECTED_SUBDIRS {
        let p = home.join(sub);
        out.push(fs::canonicalize(&p).unwrap_or(p));
    }
    out
}

/// derive the identity of a canonical path
///
/// polynomial hash (base 31, wrapping) over the UTF-16 code units of the
/// path string, reduced modulo 10^13 and zero padded. every consumer must
/// use this function so storage partitions agree.
pub fn identity_of(canonical: &Path) -> String {
    let text = canonical.to_string_lossy();
    let mut h: u64 = 0;
    for unit in text.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(u64::from(unit));
    }
    let modulus = 10u64.pow(IDENTITY_WIDTH as u32);
    format!("{:0width$}", h % modulus, width = IDENTITY_WIDTH)
}
