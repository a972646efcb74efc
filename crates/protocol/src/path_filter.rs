use crate::config::TraversalConfig;
use regex::Regex;
use std::path::Path;

/// Glob + ignore-file pattern engine shared by traversal and the watcher.
///
/// Patterns are compiled once into anchored regexes; a pattern that fails to
/// compile matches nothing rather than aborting the caller.
#[derive(Debug)]
pub struct PathFilter {
    include: Vec<CompiledPattern>,
    exclude: Vec<CompiledPattern>,
    ignore_directories: Vec<String>,
    ignore_hidden: bool,
}

#[derive(Debug)]
struct CompiledPattern {
    raw: String,
    full: Option<Regex>,
    /// For patterns containing `/`: a second regex built from only the
    /// basename portion, tried when the candidate itself has no `/` (so
    /// `**/*.js` also matches a bare `foo.js`).
    basename: Option<Regex>,
}

impl CompiledPattern {
    fn compile(raw: &str) -> Self {
        let full = compile_glob(raw);
        let basename = if raw.contains('/') {
            raw.rsplit('/').next().and_then(compile_glob_part)
        } else {
            None
        };
        if full.is_none() {
            log::warn!("ignoring unparseable glob pattern {raw:?}");
        }
        Self {
            raw: raw.to_string(),
            full,
            basename,
        }
    }

    fn matches(&self, rel_path: &str) -> bool {
        if let Some(re) = &self.full {
            if re.is_match(rel_path) {
                return true;
            }
        }
        if !rel_path.contains('/') {
            if let Some(re) = &self.basename {
                return re.is_match(rel_path);
            }
        }
        false
    }
}

fn compile_glob(pattern: &str) -> Option<Regex> {
    compile_glob_part(pattern)
}

/// Translate one glob into an anchored regex: `**` → `.*`, `*` → `[^/]*`,
/// `?` → `[^/]`, everything else taken literally.
fn compile_glob_part(pattern: &str) -> Option<Regex> {
    let mut body = String::with_capacity(pattern.len() + 8);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    body.push_str(".*");
                    i += 1;
                } else {
                    body.push_str("[^/]*");
                }
            }
            '?' => body.push_str("[^/]"),
            c if "\\.+()[]{}^$|".contains(c) => {
                body.push('\\');
                body.push(c);
            }
            c => body.push(c),
        }
        i += 1;
    }
    Regex::new(&format!("^{body}$")).ok()
}

impl PathFilter {
    /// Build a filter from traversal options alone; call [`refresh`] to pick
    /// up ignore files from a project root.
    ///
    /// [`refresh`]: PathFilter::refresh
    #[must_use]
    pub fn new(config: &TraversalConfig) -> Self {
        let include = config
            .include_patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect();
        let exclude = config
            .exclude_patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect();
        Self {
            include,
            exclude,
            ignore_directories: config.ignore_directories.clone(),
            ignore_hidden: config.ignore_hidden_files,
        }
    }

    /// Reload `.gitignore` / `.indexignore` rooted at `root` and merge their
    /// patterns into the excludes, keeping the configured patterns.
    pub fn refresh(&mut self, root: &Path, config: &TraversalConfig) {
        let mut exclude: Vec<CompiledPattern> = config
            .exclude_patterns
            .iter()
            .map(|p| CompiledPattern::compile(p))
            .collect();

        if config.respect_gitignore {
            for name in [".gitignore", ".indexignore"] {
                for pattern in load_ignore_file(&root.join(name)) {
                    exclude.push(CompiledPattern::compile(&pattern));
                }
            }
        }

        self.exclude = exclude;
    }

    /// Whether a directory of this name should be skipped entirely.
    #[must_use]
    pub fn should_ignore_dir(&self, name: &str) -> bool {
        if self.ignore_hidden && name.starts_with('.') {
            return true;
        }
        self.ignore_directories.iter().any(|d| d == name)
    }

    /// Whether a file (project-relative, `/`-separated) should be skipped.
    ///
    /// Hidden-file filtering runs before pattern matching; excludes override
    /// includes; an empty include list admits every non-excluded file.
    #[must_use]
    pub fn should_ignore_file(&self, rel_path: &str) -> bool {
        let rel_path = rel_path.replace('\\', "/");

        if self.ignore_hidden {
            let hidden = rel_path
                .split('/')
                .any(|part| part.starts_with('.') && !part.is_empty());
            if hidden {
                return true;
            }
        }

        if rel_path
            .split('/')
            .any(|part| self.ignore_directories.iter().any(|d| d == part))
        {
            return true;
        }

        if self.exclude.iter().any(|p| p.matches(&rel_path)) {
            return true;
        }

        if self.include.is_empty() {
            return false;
        }
        !self.include.iter().any(|p| p.matches(&rel_path))
    }

    /// Raw exclude patterns currently in effect (configured + ignore files).
    #[must_use]
    pub fn exclude_patterns(&self) -> Vec<String> {
        self.exclude.iter().map(|p| p.raw.clone()).collect()
    }
}

/// Parse an ignore file into glob patterns. Comments, blank lines and
/// negations are skipped; directory lines cover their whole subtree.
fn load_ignore_file(path: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut patterns = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let line = line.strip_prefix('/').unwrap_or(line);
        let base = line.strip_suffix('/').unwrap_or(line);
        if base.is_empty() {
            continue;
        }
        patterns.push(base.to_string());
        patterns.push(format!("{base}/**"));
        if !base.contains('/') {
            patterns.push(format!("**/{base}"));
            patterns.push(format!("**/{base}/**"));
        }
    }
    patterns
}
