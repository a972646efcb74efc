use crate::error::{IndexerError, Result};
use semsync_protocol::{PathFilter, TraversalConfig};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Hard cap on distinct real directories visited in one traversal; beyond
/// this the remaining subtree is abandoned with an error.
const MAX_VISITED_DIRS: usize = 1_000;

/// Bytes probed for a NUL when classifying a file as binary.
const BINARY_PROBE_LEN: usize = 1_024;

/// One file as seen by traversal: identity, content hash, detected language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub content_hash: String,
    pub mtime: i64,
    pub language: Option<String>,
    pub is_binary: bool,
}

/// Outcome of a traversal. Errors are accumulated, never thrown mid-walk;
/// only an unreadable root aborts.
#[derive(Debug, Default)]
pub struct TraversalResult {
    pub files: Vec<FileRecord>,
    pub directories: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub total_size: u64,
    pub processing_time: Duration,
}

/// Filtered, hashed, cycle-guarded directory walker.
pub struct FileScanner {
    root: PathBuf,
    config: TraversalConfig,
    filter: PathFilter,
}

impl FileScanner {
    /// Build a scanner for a project root, loading ignore files when
    /// configured.
    pub fn new(root: impl AsRef<Path>, config: TraversalConfig) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut filter = PathFilter::new(&config);
        if config.respect_gitignore {
            filter.refresh(&root, &config);
        }
        Self {
            root,
            config,
            filter,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the project. Blocking; call from `spawn_blocking` in async
    /// contexts.
    pub fn scan(&self) -> Result<TraversalResult> {
        let started = Instant::now();
        let mut result = TraversalResult::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();

        let root_real = self.root.canonicalize().map_err(|e| {
            IndexerError::Other(format!("unreadable root {}: {e}", self.root.display()))
        })?;
        visited.insert(root_real);

        self.walk_dir(&self.root, &mut visited, &mut result);

        result.processing_time = started.elapsed();
        Ok(result)
    }

    fn walk_dir(
        &self,
        dir: &Path,
        visited: &mut HashSet<PathBuf>,
        result: &mut TraversalResult,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                result
                    .errors
                    .push(format!("cannot read directory {}: {e}", dir.display()));
                return;
            }
        };
        result.directories.push(dir.to_path_buf());

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    result
                        .errors
                        .push(format!("cannot read entry in {}: {e}", dir.display()));
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    result
                        .errors
                        .push(format!("cannot stat {}: {e}", path.display()));
                    continue;
                }
            };

            if file_type.is_symlink() && !self.config.follow_symlinks {
                continue;
            }

            let resolved_is_dir = if file_type.is_symlink() {
                path.metadata().map(|m| m.is_dir()).unwrap_or(false)
            } else {
                file_type.is_dir()
            };

            if resolved_is_dir {
                self.enter_dir(&path, visited, result);
            } else {
                self.visit_file(&path, result);
            }
        }
    }

    fn enter_dir(
        &self,
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        result: &mut TraversalResult,
    ) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.filter.should_ignore_dir(&name) {
            return;
        }

        // Cycle guard over real paths: a directory is entered exactly once
        // no matter how many symlinks lead to it.
        let real = match path.canonicalize() {
            Ok(real) => real,
            Err(e) => {
                result
                    .errors
                    .push(format!("cannot resolve {}: {e}", path.display()));
                return;
            }
        };
        if visited.contains(&real) {
            result.errors.push(format!(
                "circular reference skipped: {} resolves to already-visited {}",
                path.display(),
                real.display()
            ));
            return;
        }
        if visited.len() >= MAX_VISITED_DIRS {
            result.errors.push(format!(
                "directory limit ({MAX_VISITED_DIRS}) reached; skipping subtree {}",
                path.display()
            ));
            return;
        }
        visited.insert(real);

        self.walk_dir(path, visited, result);
    }

    fn visit_file(&self, path: &Path, result: &mut TraversalResult) {
        let rel_path = match path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => path.to_string_lossy().to_string(),
        };

        if self.filter.should_ignore_file(&rel_path) {
            return;
        }

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let language = match self.config.supported_extensions.get(&extension) {
            Some(lang) => lang.clone(),
            // Extension not in the whitelist: not an error, just unindexed.
            None => return,
        };

        let metadata = match path.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                result
                    .errors
                    .push(format!("cannot stat file {rel_path}: {e}"));
                return;
            }
        };
        let size = metadata.len();
        if size > self.config.max_file_size {
            result.errors.push(format!(
                "file too large: {rel_path} is {size} bytes (limit {})",
                self.config.max_file_size
            ));
            return;
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                result
                    .errors
                    .push(format!("cannot read file {rel_path}: {e}"));
                return;
            }
        };

        if is_binary(&bytes) {
            // Binary files are skipped from chunking and not tracked.
            return;
        }

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        result.total_size += size;
        result.files.push(FileRecord {
            abs_path: path.to_path_buf(),
            rel_path,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            extension,
            size,
            content_hash: hash_bytes(&bytes),
            mtime,
            language: Some(language),
            is_binary: false,
        });
    }
}

/// SHA-256 over raw bytes, lowercase hex.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// A zero byte within the first 1024 bytes classifies the file as binary.
#[must_use]
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(BINARY_PROBE_LEN)
        .any(|&b| b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use semsync_protocol::TraversalConfig;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn scan(root: &Path) -> TraversalResult {
        FileScanner::new(root, TraversalConfig::default())
            .scan()
            .unwrap()
    }

    #[test]
    fn finds_supported_files_with_hashes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/lib.rs", b"pub fn x() {}\n");
        write(temp.path(), "README.md", b"# readme\n");
        write(temp.path(), "binary.rs", b"\x00\x01\x02rest");
        write(temp.path(), "image.png", b"not really a png");

        let result = scan(temp.path());
        let mut rels: Vec<&str> = result.files.iter().map(|f| f.rel_path.as_str()).collect();
        rels.sort_unstable();

        // The zero-byte file is binary, the png extension is unmapped.
        assert_eq!(rels, vec!["README.md", "src/lib.rs"]);

        let lib = result
            .files
            .iter()
            .find(|f| f.rel_path == "src/lib.rs")
            .unwrap();
        assert_eq!(lib.language.as_deref(), Some("rust"));
        assert_eq!(lib.content_hash.len(), 64);
        assert_eq!(lib.size, 14);
        assert!(!lib.is_binary);
    }

    #[test]
    fn hash_is_stable_across_mtime_changes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.rs", b"fn a() {}\n");
        let first = scan(temp.path()).files[0].content_hash.clone();

        // Rewrite identical bytes; mtime moves, the hash must not.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write(temp.path(), "a.rs", b"fn a() {}\n");
        let second = scan(temp.path()).files[0].content_hash.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn ignores_default_directories_and_hidden_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "node_modules/lib/index.js", b"x");
        write(temp.path(), ".hidden/secret.rs", b"x");
        write(temp.path(), "src/ok.rs", b"fn ok() {}");

        let result = scan(temp.path());
        let rels: Vec<&str> = result.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["src/ok.rs"]);
    }

    #[test]
    fn oversize_files_are_reported_not_indexed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "big.rs", &vec![b'a'; 4096]);
        write(temp.path(), "ok.rs", b"fn ok() {}");

        let config = TraversalConfig {
            max_file_size: 1024,
            ..Default::default()
        };
        let result = FileScanner::new(temp.path(), config).scan().unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].rel_path, "ok.rs");
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("big.rs") && e.contains("too large")));
    }

    #[test]
    fn respects_gitignore_when_configured() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".gitignore", b"generated/\n*.tmp.rs\n");
        write(temp.path(), "generated/out.rs", b"fn gen() {}");
        write(temp.path(), "scratch.tmp.rs", b"fn tmp() {}");
        write(temp.path(), "src/keep.rs", b"fn keep() {}");

        let result = scan(temp.path());
        let rels: Vec<&str> = result.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["src/keep.rs"]);
    }

    #[test]
    fn unreadable_root_is_the_only_fatal_error() {
        let temp = TempDir::new().unwrap();
        let ghost = temp.path().join("missing");
        let scanner = FileScanner::new(&ghost, TraversalConfig::default());
        assert!(scanner.scan().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_reported_once() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/a.rs", b"fn a() {}");
        // Loop: src/loop -> root.
        std::os::unix::fs::symlink(temp.path(), temp.path().join("src/loop")).unwrap();

        let config = TraversalConfig {
            follow_symlinks: true,
            ..Default::default()
        };
        let result = FileScanner::new(temp.path(), config).scan().unwrap();

        assert_eq!(result.files.len(), 1);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("circular reference")));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_skipped_by_default() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "real/target.rs", b"fn t() {}");
        std::os::unix::fs::symlink(
            temp.path().join("real/target.rs"),
            temp.path().join("alias.rs"),
        )
        .unwrap();

        let result = scan(temp.path());
        let rels: Vec<&str> = result.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["real/target.rs"]);
    }

    #[test]
    fn binary_probe_only_checks_leading_bytes() {
        let mut tail_zero = vec![b'a'; 2048];
        tail_zero.push(0);
        assert!(!is_binary(&tail_zero));

        let mut head_zero = vec![b'a'; 10];
        head_zero[5] = 0;
        assert!(is_binary(&head_zero));
    }
}
