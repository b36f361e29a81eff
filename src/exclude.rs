//! per-path eligibility for tracking
//!
//! A path is relative to the tracked root and uses `/` separators. Decisions
//! are made in this order, first match wins:
//!
//! 1. the engine's own storage directory name or index file name, and any
//!    state directory reserved for the workspace
//! 2. operating system noise files
//! 3. rule set patterns, in load order
//!
//! Pattern forms:
//!
//! - `dir/` matches the directory and everything below it. A single-segment
//!   directory pattern matches that directory at any depth. Wildcards in a
//!   directory pattern are allowed.
//! - `*.ext` matches by suffix.
//! - anything else with `*`, `?` or `[` is a glob, translated to a regex;
//!   an untranslatable glob falls back to exact matching.
//! - everything else matches the full path or the basename exactly.

use std::fs;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};

/// name of the engine's own storage directory
pub const STORAGE_DIR_NAME: &str = ".rewind";

/// file name of the checkpoint index
pub const INDEX_FILE_NAME: &str = "rewind-index.json";

/// attributes file scanned for large-file markers
pub const LARGE_FILE_MARKER: &str = ".gitattributes";

const OS_NOISE: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "ehthumbs.db"];

const DEFAULT_RULES: &[&str] = &[
    // version control metadata
    ".git/",
    ".hg/",
    ".svn/",
    ".jj/",
    // dependencies
    "node_modules/",
    "bower_components/",
    "jspm_packages/",
    ".venv/",
    "venv/",
    "__pycache__/",
    ".tox/",
    ".gradle/",
    "Pods/",
    "vendor/bundle/",
    // build output
    "target/",
    "dist/",
    "build/",
    "out/",
    ".next/",
    ".nuxt/",
    ".turbo/",
    ".parcel-cache/",
    ".svelte-kit/",
    "coverage/",
    ".cache/",
    "*.o",
    "*.a",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.exe",
    "*.class",
    "*.jar",
    "*.pyc",
    "*.pyo",
    "*.wasm",
    // media and archives
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.webp",
    "*.tiff",
    "*.psd",
    "*.mp3",
    "*.mp4",
    "*.mov",
    "*.avi",
    "*.mkv",
    "*.wav",
    "*.flac",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.tgz",
    "*.bz2",
    "*.xz",
    "*.7z",
    "*.rar",
    "*.iso",
    "*.dmg",
    "*.ttf",
    "*.otf",
    "*.woff",
    "*.woff2",
    "*.sqlite",
    "*.sqlite3",
    "*.db",
    // caches and temp files
    "*.log",
    "*.tmp",
    "*.temp",
    "*.swp",
    "*.swo",
    "*.bak",
    "*~",
    ".eslintcache",
    "*.tsbuildinfo",
    // environment and secrets
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "id_rsa",
    "id_ed25519",
    ".npmrc",
    ".pypirc",
    ".netrc",
];

#[derive(Debug, Clone)]
enum Matcher {
    /// directory path without the trailing slash
    Directory(String),
    /// suffix including the dot
    Extension(String),
    Wildcard {
        regex: Regex,
        /// pattern had no slash, so it may match the basename alone
        basename: bool,
    },
    Exact(String),
}

/// one exclusion pattern with its compiled matcher
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: String,
    matcher: Matcher,
}

impl Rule {
    /// compile a pattern, `None` for blank input
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        let body = pattern.trim_start_matches('/');
        if body.is_empty() {
            return None;
        }

        let matcher = if let Some(dir) = body.strip_suffix('/') {
            let dir = dir.trim_end_matches('/');
            if has_wildcard(dir) {
                directory_glob(dir)
            } else {
                Matcher::Directory(dir.to_string())
            }
        } else if let Some(ext) = body.strip_prefix("*.").filter(|e| !has_wildcard(e)) {
            Matcher::Extension(format!(".{}", ext))
        } else if has_wildcard(body) {
            match Regex::new(&glob_to_regex(body)) {
                Ok(regex) => Matcher::Wildcard {
                    regex,
                    basename: !body.contains('/'),
                },
                Err(_) => Matcher::Exact(body.to_string()),
            }
        } else {
            Matcher::Exact(body.to_string())
        };

        Some(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    /// pattern as written
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, path: &str) -> bool {
        let name = basename(path);
        match &self.matcher {
            Matcher::Directory(dir) => {
                if path == dir || path.starts_with(&format!("{}/", dir)) {
                    return true;
                }
                !dir.contains('/')
                    && path
                        .split('/')
                        .any(|component| component == dir.as_str())
            }
            Matcher::Extension(suffix) => path.ends_with(suffix.as_str()),
            Matcher::Wildcard { regex, basename } => {
                regex.is_match(path) || (*basename && regex.is_match(name))
            }
            Matcher::Exact(exact) => path == exact || name == exact,
        }
    }
}

/// ordered collection of exclusion rules
#[derive(Debug, Clone, Default)]
pub struct ExclusionRuleSet {
    rules: Vec<Rule>,
    /// workspace-relative paths holding the engine's own state
    reserved: Vec<String>,
}

impl ExclusionRuleSet {
    /// the built-in catalog
    pub fn defaults() -> Self {
        let mut set = Self::default();
        for pattern in DEFAULT_RULES {
            set.push(pattern);
        }
        set
    }

    /// full rule set for a workspace: defaults, then the custom file, then
    /// large-file markers found under the root
    pub fn load(root: &Path, rules_file: Option<&Path>) -> Result<Self> {
        Self::load_reserving(root, rules_file, &[])
    }

    /// like [`ExclusionRuleSet::load`], with engine state directories
    /// reserved before the root is scanned for markers
    pub fn load_reserving(root: &Path, rules_file: Option<&Path>, reserved: &[String]) -> Result<Self> {
        let mut set = Self::defaults();
        for dir in reserved {
            set.reserve(dir);
        }
        if let Some(file) = rules_file {
            let added = set.extend_from_file(file)?;
            tracing::debug!(file = %file.display(), rules = added, "loaded custom exclusion rules");
        }
        for pattern in large_file_patterns(root, &set) {
            set.push(&pattern);
        }
        Ok(set)
    }

    /// append one pattern, ignoring blanks
    pub fn push(&mut self, pattern: &str) {
        if let Some(rule) = Rule::parse(pattern) {
            self.rules.push(rule);
        }
    }

    /// append patterns from text, one per line, `#` starts a comment line
    pub fn extend_from_str(&mut self, text: &str) -> usize {
        let before = self.rules.len();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.push(line);
        }
        self.rules.len() - before
    }

    /// append patterns from a rules file
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize> {
        let text = fs::read_to_string(path).with_path(path)?;
        Ok(self.extend_from_str(&text))
    }

    /// exclude a directory of engine state, ahead of every rule
    ///
    /// the path is anchored at the root: `state` matches `state` and
    /// `state/...` but not `sub/state`.
    pub fn reserve(&mut self, relative_dir: &str) {
        let dir = relative_dir.trim_start_matches("./").trim_matches('/');
        if !dir.is_empty() && !self.reserved.iter().any(|r| r == dir) {
            self.reserved.push(dir.to_string());
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// shorthand for [`is_excluded`]
    pub fn excludes(&self, relative_path: &str) -> bool {
        is_excluded(relative_path, self)
    }
}

/// decide whether a relative path is kept out of snapshots
pub fn is_excluded(relative_path: &str, rules: &ExclusionRuleSet) -> bool {
    let path = relative_path.trim_start_matches("./").trim_matches('/');
    if path.is_empty() {
        return false;
    }

    if path.contains(STORAGE_DIR_NAME) || path.split('/').any(|c| c == INDEX_FILE_NAME) {
        return true;
    }

    if rules
        .reserved
        .iter()
        .any(|dir| path == dir || path.strip_prefix(dir.as_str()).is_some_and(|rest| rest.starts_with('/')))
    {
        return true;
    }

    if OS_NOISE.contains(&basename(path)) {
        return true;
    }

    rules.rules.iter().any(|rule| rule.matches(path))
}

/// patterns marked for large-file storage in any attributes file under root
pub fn large_file_patterns(root: &Path, rules: &ExclusionRuleSet) -> Vec<String> {
    let mut patterns = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        match relative_str(root, entry.path()) {
            Some(rel) => !is_excluded(&rel, rules),
            None => true,
        }
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.file_name() != LARGE_FILE_MARKER {
            continue;
        }
        let text = match fs::read_to_string(entry.path()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "unreadable attributes file");
                continue;
            }
        };
        let dir = entry
            .path()
            .parent()
            .and_then(|p| relative_str(root, p))
            .unwrap_or_default();
        patterns.extend(parse_large_file_markers(&text, &dir));
    }

    patterns
}

/// extract `filter=lfs` patterns, anchored to the attributes file's directory
fn parse_large_file_markers(text: &str, dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let Some(pattern) = fields.next() else {
            continue;
        };
        if !fields.any(|attr| attr == "filter=lfs") {
            continue;
        }
        // a pattern without a slash matches at any depth below its file
        let anchored = pattern.trim_end_matches('/').contains('/');
        let pattern = pattern.trim_start_matches('/');
        if dir.is_empty() {
            out.push(pattern.to_string());
        } else if anchored {
            out.push(format!("{}/{}", dir, pattern));
        } else {
            out.push(format!("{}/**/{}", dir, pattern));
        }
    }
    out
}

/// a directory pattern with wildcards, matching the directory and its contents
fn directory_glob(dir: &str) -> Matcher {
    let translated = glob_to_regex(dir);
    let inner = translated
        .strip_prefix('^')
        .and_then(|t| t.strip_suffix('$'))
        .unwrap_or(&translated);
    let lead = if dir.contains('/') { "" } else { "(?:.*/)?" };
    match Regex::new(&format!("^{}{}(?:/.*)?$", lead, inner)) {
        Ok(regex) => Matcher::Wildcard {
            regex,
            basename: false,
        },
        Err(_) => Matcher::Directory(dir.to_string()),
    }
}

/// restricted glob translation: `**` spans directories, `*` and `?` do not
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                // copied through; an unterminated class makes the regex invalid
                for inner in chars.by_ref() {
                    if inner == '\\' {
                        out.push_str("\\\\");
                        continue;
                    }
                    out.push(inner);
                    if inner == ']' {
                        break;
                    }
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `/`-separated path of `path` under `root`, `None` for the root itself
pub(crate) fn relative_str(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
