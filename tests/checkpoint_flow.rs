use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use rewind::{ChangeKind, CheckpointEngine, Checkpoints, EngineConfig, Error};

struct Fixture {
    dir: TempDir,
    root: PathBuf,
    config: EngineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        fs::create_dir(&root).unwrap();
        let config = EngineConfig::new(&root).with_storage_root(dir.path().join("storage"));
        Self {
            dir,
            root,
            config,
        }
    }

    fn engine(&self) -> CheckpointEngine {
        CheckpointEngine::open(&self.config).unwrap()
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap()
    }
}

/// every regular file under root, relative, sorted
fn tree_state(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut out: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    out.sort();
    out
}

#[test]
fn test_hello_world_scenario() {
    let fx = Fixture::new();
    let engine = fx.engine();

    fx.write("a.txt", "hello");
    let c1 = engine.create_checkpoint(Some("C1")).unwrap();
    assert_eq!(c1.files_changed, 1);

    fx.write("a.txt", "world");
    fx.write("b.txt", "new");
    let c2 = engine.create_checkpoint(Some("C2")).unwrap();
    assert_eq!(c2.files_changed, 2);

    let report = engine.diff(&c1.checkpoint_id, Some(&c2.checkpoint_id)).unwrap();
    assert_eq!(report.total_files, 2);
    assert_eq!(report.to_id.as_deref(), Some(c2.checkpoint_id.as_str()));

    let a = &report.changes[0];
    assert_eq!(a.relative_path, "a.txt");
    assert_eq!(a.change_type, ChangeKind::Modified);
    assert_eq!(a.before_preview.as_deref(), Some("hello"));
    assert_eq!(a.after_preview.as_deref(), Some("world"));

    let b = &report.changes[1];
    assert_eq!(b.relative_path, "b.txt");
    assert_eq!(b.change_type, ChangeKind::Added);
    assert_eq!(b.before_size, 0);
    assert_eq!(b.after_size, 3);

    let outcome = engine.rollback(&c1.checkpoint_id);
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(fx.read("a.txt"), "hello");
    assert!(!fx.root.join("b.txt").exists());
}

#[test]
fn test_no_changes_means_zero() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("src/main.rs", "fn main() {}");
    fx.write("README.md", "# readme");

    let first = engine.create_checkpoint(None).unwrap();
    assert_eq!(first.files_changed, 2);

    for _ in 0..3 {
        let next = engine.create_checkpoint(None).unwrap();
        assert_eq!(next.files_changed, 0);
        assert_ne!(next.snapshot_ref, first.snapshot_ref);
    }
}

#[test]
fn test_first_checkpoint_counts_eligible_files() {
    let fx = Fixture::new();
    fx.write("one.txt", "1");
    fx.write("dir/two.txt", "2");
    fx.write("dir/deeper/three.txt", "3");
    fx.write("target/debug/app", "binary");
    fx.write(".env", "TOKEN=abc");
    fx.write("logo.png", "png");

    let created = fx.engine().create_checkpoint(None).unwrap();
    assert_eq!(created.files_changed, 3);
}

#[test]
fn test_rollback_then_diff_is_empty() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("a.txt", "a");
    fx.write("nested/b.txt", "b");
    let c1 = engine.create_checkpoint(None).unwrap();

    fx.write("a.txt", "changed");
    fs::remove_file(fx.root.join("nested/b.txt")).unwrap();
    fx.write("c.txt", "c");
    engine.create_checkpoint(None).unwrap();
    fx.write("uncommitted.txt", "u");

    assert!(engine.rollback(&c1.checkpoint_id).success);

    let report = engine.diff(&c1.checkpoint_id, None).unwrap();
    assert_eq!(report.total_files, 0, "{:?}", report.changes);
    assert!(report.to_id.is_none());
}

#[test]
fn test_rollback_is_idempotent() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("a.txt", "a");
    let c1 = engine.create_checkpoint(None).unwrap();

    fx.write("a.txt", "b");
    fx.write("x/y.txt", "y");
    engine.create_checkpoint(None).unwrap();

    assert!(engine.rollback(&c1.checkpoint_id).success);
    let once = tree_state(&fx.root);
    assert!(engine.rollback(&c1.checkpoint_id).success);
    assert_eq!(tree_state(&fx.root), once);
}

#[test]
fn test_excluded_files_never_count() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("keep.txt", "k");
    let c1 = engine.create_checkpoint(None).unwrap();

    fx.write("node_modules/pkg/index.js", "x");
    fx.write("debug.log", "noise");
    fx.write(".env.local", "SECRET=1");
    let c2 = engine.create_checkpoint(None).unwrap();
    assert_eq!(c2.files_changed, 0);

    fx.write("node_modules/pkg/index.js", "y");
    fs::remove_file(fx.root.join("debug.log")).unwrap();
    let c3 = engine.create_checkpoint(None).unwrap();
    assert_eq!(c3.files_changed, 0);

    let report = engine.diff(&c1.checkpoint_id, None).unwrap();
    assert_eq!(report.total_files, 0);
}

#[test]
fn test_metadata_named_file_is_never_tracked() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("real.txt", "r");
    let c1 = engine.create_checkpoint(None).unwrap();

    fx.write("rewind-index.json", "[]");
    fx.write("sub/rewind-index.json", "[]");
    fx.write(".rewind/anything", "x");

    let c2 = engine.create_checkpoint(None).unwrap();
    assert_eq!(c2.files_changed, 0);
    assert_eq!(engine.diff(&c1.checkpoint_id, None).unwrap().total_files, 0);
}

#[test]
fn test_custom_rules_augment_defaults() {
    let fx = Fixture::new();
    let rules = fx.dir.path().join("rules.txt");
    fs::write(&rules, "# local data\n*.csv\nscratch/\n").unwrap();
    let config = fx.config.clone().with_rules_file(&rules);
    let engine = CheckpointEngine::open(&config).unwrap();

    fx.write("data.csv", "1,2");
    fx.write("scratch/notes.md", "n");
    fx.write("node_modules/x.js", "x");
    fx.write("main.py", "print()");

    assert_eq!(engine.create_checkpoint(None).unwrap().files_changed, 1);
}

#[test]
fn test_large_file_markers_are_excluded() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write(".gitattributes", "*.bin filter=lfs diff=lfs merge=lfs -text\n");
    fx.write("weights.bin", "big");
    fx.write("model.py", "m");

    // .gitattributes itself plus model.py
    assert_eq!(engine.create_checkpoint(None).unwrap().files_changed, 2);
}

#[test]
fn test_existing_git_state_is_untouched() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write(".git/HEAD", "ref: refs/heads/main\n");
    fx.write(".git/config", "[core]\n");
    fx.write("src/lib.rs", "v1");
    let c1 = engine.create_checkpoint(None).unwrap();
    assert_eq!(c1.files_changed, 1);

    fx.write(".git/HEAD", "ref: refs/heads/feature\n");
    fx.write("src/lib.rs", "v2");
    assert!(engine.rollback(&c1.checkpoint_id).success);

    assert_eq!(fx.read("src/lib.rs"), "v1");
    assert_eq!(fx.read(".git/HEAD"), "ref: refs/heads/feature\n");
}

#[test]
fn test_listing_is_sorted_descending() {
    let fx = Fixture::new();
    let engine = fx.engine();
    let mut ids = Vec::new();
    for i in 0..4 {
        fx.write("f.txt", &i.to_string());
        ids.push(engine.create_checkpoint(Some(&format!("c{i}"))).unwrap().checkpoint_id);
    }

    let listed = engine.list_checkpoints(None).unwrap();
    assert!(listed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    ids.reverse();
    assert_eq!(listed.iter().map(|l| l.id.clone()).collect::<Vec<_>>(), ids);
}

#[test]
fn test_rollback_reports_files_restored() {
    let fx = Fixture::new();
    let engine = fx.engine();
    fx.write("a.txt", "a");
    let c1 = engine.create_checkpoint(None).unwrap();
    fx.write("a.txt", "b");
    fx.write("b.txt", "b");
    fx.write("c.txt", "c");
    engine.create_checkpoint(None).unwrap();

    let outcome = engine.rollback(&c1.checkpoint_id);
    assert!(outcome.success);
    assert_eq!(outcome.files_restored, 3);
    assert_eq!(outcome.checkpoint_id, c1.checkpoint_id);

    // history stays forward-only
    assert_eq!(engine.list_checkpoints(None).unwrap().len(), 2);
    let c3 = engine.create_checkpoint(None).unwrap();
    assert_eq!(c3.files_changed, 3);
}

#[test]
fn test_separate_workspaces_are_isolated() {
    let fx = Fixture::new();
    let other_root = fx.dir.path().join("other");
    fs::create_dir(&other_root).unwrap();
    let other = CheckpointEngine::open(&EngineConfig {
        workspace: other_root,
        ..fx.config.clone()
    })
    .unwrap();
    let engine = fx.engine();

    fx.write("a.txt", "a");
    engine.create_checkpoint(None).unwrap();

    assert_ne!(engine.workspace().identity(), other.workspace().identity());
    assert_eq!(other.status().unwrap().total_checkpoints, 0);
    assert_eq!(engine.status().unwrap().total_checkpoints, 1);
}

#[test]
fn test_home_directory_is_refused_before_storage_exists() {
    let Some(home) = dirs::home_dir().filter(|h| h.is_dir()) else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let storage = dir.path().join("storage");

    let result = CheckpointEngine::open(&EngineConfig::new(&home).with_storage_root(&storage));
    assert!(matches!(result, Err(Error::ProtectedDirectory(_))));
    assert!(!storage.exists());
}

#[test]
fn test_missing_workspace_is_invalid() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::new(dir.path().join("nope")).with_storage_root(dir.path().join("s"));

    assert!(matches!(
        CheckpointEngine::open(&config),
        Err(Error::InvalidWorkspace { .. })
    ));
}

#[tokio::test]
async fn test_async_facade_flow() {
    let fx = Fixture::new();
    let service = Checkpoints::new(fx.config.clone());

    fx.write("a.txt", "hello");
    let c1 = service.create_checkpoint(Some("C1".to_string())).await.unwrap();
    fx.write("a.txt", "world");

    let report = service.diff(c1.checkpoint_id.clone(), None).await.unwrap();
    assert_eq!(report.total_files, 1);

    let outcome = service.rollback(c1.checkpoint_id.clone()).await;
    assert!(outcome.success);
    assert_eq!(fx.read("a.txt"), "hello");

    let status = service.status().await.unwrap();
    assert_eq!(status.current_checkpoint.unwrap().id, c1.checkpoint_id);
}

#[tokio::test]
async fn test_async_home_directory_is_refused() {
    let Some(home) = dirs::home_dir().filter(|h| h.is_dir()) else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let service = Checkpoints::new(EngineConfig::new(home).with_storage_root(dir.path().join("s")));

    let result = service.create_checkpoint(None).await;
    assert!(matches!(result, Err(Error::ProtectedDirectory(_))));
}
