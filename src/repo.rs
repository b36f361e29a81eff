use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::StoreConfig;
use crate::error::{Error, IoResultExt, Result};
use crate::object::{tree_exists, write_tree, EMPTY_TREE};
use crate::types::Tree;
use crate::workspace::Workspace;

/// the on-disk snapshot store for one workspace
pub struct Repo {
    path: PathBuf,
    config: StoreConfig,
}

impl Repo {
    /// create the store layout at `path`
    ///
    /// an existing store is opened instead of being overwritten.
    pub fn init(path: &Path) -> Result<Self> {
        Self::init_with(path, StoreConfig::new(PathBuf::new(), String::new()))
    }

    fn init_with(path: &Path, config: StoreConfig) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Self::open(path);
        }

        for sub in ["objects/blobs", "objects/trees", "objects/commits", "refs", "tmp"] {
            let dir = path.join(sub);
            std::fs::create_dir_all(&dir).with_path(&dir)?;
        }

        let repo = Self {
            path: path.to_path_buf(),
            config,
        };

        // serialize initialization against a concurrent init of the same store
        let _lock = repo.lock()?;
        if !tree_exists(&repo, &EMPTY_TREE) {
            write_tree(&repo, &Tree::empty())?;
        }
        if !config_path.exists() {
            repo.config.save(&config_path)?;
        }

        tracing::debug!(path = %path.display(), "initialized snapshot store");
        Ok(repo)
    }

    /// open an existing store
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::backend(path, "no snapshot store"));
        }

        let config = StoreConfig::load(&config_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// open the store for a workspace, creating it on first use
    ///
    /// any failure here means the snapshot backend cannot be used and is
    /// reported as `BackendUnavailable`.
    pub fn open_or_init(path: &Path, workspace: &Workspace) -> Result<Self> {
        let config = StoreConfig::new(workspace.path(), workspace.identity());
        let repo = Self::init_with(path, config).map_err(|e| Error::backend(path, e))?;

        if !repo.config.identity.is_empty() && repo.config.identity != workspace.identity() {
            return Err(Error::backend(
                path,
                format!(
                    "store belongs to identity {}, not {}",
                    repo.config.identity,
                    workspace.identity()
                ),
            ));
        }
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    pub fn blobs_path(&self) -> PathBuf {
        self.objects_path().join("blobs")
    }

    pub fn trees_path(&self) -> PathBuf {
        self.objects_path().join("trees")
    }

    pub fn commits_path(&self) -> PathBuf {
        self.objects_path().join("commits")
    }

    /// file holding the hash of the newest snapshot
    pub fn head_path(&self) -> PathBuf {
        self.path.join("refs/head")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(".lock")
    }

    /// acquire exclusive lock on the store, waiting for other holders
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock =
            Flock::lock(file, FlockArg::LockExclusive).map_err(|_| Error::LockContention)?;
        Ok(RepoLock { flock })
    }

    /// try to acquire exclusive lock, returning None if already locked
    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(RepoLock { flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }
}

/// guard that holds the store lock until dropped
pub struct RepoLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}
