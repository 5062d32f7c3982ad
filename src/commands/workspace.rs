use crate::error::{MonitorError, Result};
use crate::models::config::MonitorConfig;
use git2::Repository;
use glob::Pattern;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Ignore-file entries that are also handed to tools as exclusion args,
/// since tools cannot read the ignore file themselves.
pub const COMMON_IGNORE_PATTERNS: [&str; 12] = [
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    "*.pyc",
    ".mypy_cache",
    ".pytest_cache",
    ".coverage",
    "*.egg-info",
    "build",
    "dist",
    "node_modules",
];

const SKIPPED_DIRS: [&str; 6] = ["__pycache__", "node_modules", ".venv", "venv", "build", "dist"];

/// How far up from the source directory to look for a `tests/` directory.
const TEST_DIR_SEARCH_DEPTH: usize = 5;

/// Exclusion rules for one source tree: configured globs, optionally the
/// ignore file, and a fixed set of never-analysed directories.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    source_dir: PathBuf,
    project_root: PathBuf,
    configured: Vec<String>,
    patterns: Vec<Pattern>,
    respect_gitignore: bool,
}

impl ExclusionFilter {
    pub fn new(
        source_dir: &Path,
        project_root: &Path,
        exclude_patterns: &[String],
        respect_gitignore: bool,
    ) -> Result<Self> {
        let mut patterns = exclude_patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Outside a repository git2 has nothing to consult, so the root
        // ignore file is read as plain glob lines.
        if respect_gitignore && Repository::discover(source_dir).is_err() {
            patterns.extend(read_ignore_file(&source_dir.join(".gitignore")));
        }

        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            project_root: project_root.to_path_buf(),
            configured: exclude_patterns.to_vec(),
            patterns,
            respect_gitignore,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        Self::new(
            &config.source_dir,
            &config.project_root,
            &config.exclude_patterns,
            config.respect_gitignore,
        )
    }

    /// Patterns passed to tools that accept path filters.
    pub fn tool_patterns(&self) -> Vec<String> {
        let mut all = self.configured.clone();
        if self.respect_gitignore {
            all.extend(COMMON_IGNORE_PATTERNS.iter().map(|p| p.to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        all.retain(|p| seen.insert(p.clone()));
        all
    }

    /// Opens the repository once for a batch of checks.
    pub fn matcher(&self) -> PathMatcher<'_> {
        let repo = if self.respect_gitignore {
            Repository::discover(&self.source_dir).ok()
        } else {
            None
        };
        PathMatcher { filter: self, repo }
    }

    fn relative<'p>(&self, path: &'p Path) -> std::borrow::Cow<'p, Path> {
        let absolute = if path.is_absolute() {
            std::borrow::Cow::Borrowed(path)
        } else {
            std::borrow::Cow::Owned(self.project_root.join(path))
        };
        match absolute.strip_prefix(&self.source_dir) {
            Ok(rel) => std::borrow::Cow::Owned(rel.to_path_buf()),
            Err(_) => std::borrow::Cow::Borrowed(path),
        }
    }
}

pub struct PathMatcher<'a> {
    filter: &'a ExclusionFilter,
    repo: Option<Repository>,
}

impl PathMatcher<'_> {
    pub fn is_excluded_str(&self, path: &str) -> bool {
        self.is_excluded(Path::new(path))
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let relative = self.filter.relative(path);
        let components: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        if components
            .iter()
            .any(|part| (part.starts_with('.') && part.len() > 1) || SKIPPED_DIRS.contains(&part.as_str()))
        {
            return true;
        }

        let joined = components.join("/");
        let pattern_hit = self.filter.patterns.iter().any(|pattern| {
            pattern.matches(&joined) || components.iter().any(|part| pattern.matches(part))
        });
        if pattern_hit {
            return true;
        }

        self.is_git_ignored(&self.filter.source_dir.join(relative.as_ref()))
    }

    fn is_git_ignored(&self, absolute: &Path) -> bool {
        let Some(repo) = &self.repo else {
            return false;
        };
        let Some(workdir) = repo.workdir() else {
            return false;
        };
        let workdir = workdir.canonicalize().unwrap_or_else(|_| workdir.to_path_buf());
        let absolute = absolute.canonicalize().unwrap_or_else(|_| absolute.to_path_buf());
        match absolute.strip_prefix(&workdir) {
            Ok(rel) if !rel.as_os_str().is_empty() => repo.is_path_ignored(rel).unwrap_or(false),
            _ => false,
        }
    }
}

fn read_ignore_file(path: &Path) -> Vec<Pattern> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| Pattern::new(line.trim_matches('/')).ok())
        .collect()
}

/// Python files of the tree after exclusions, with the counts parsers
/// normalise against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceInventory {
    pub files: Vec<PathBuf>,
    pub total_lines: u64,
    pub function_count: u64,
    pub class_count: u64,
}

impl SourceInventory {
    /// Declarations a dead-code finding can refer to.
    pub fn symbol_count(&self) -> u64 {
        self.function_count + self.class_count
    }

    /// Units that can carry a docstring: modules, functions, classes.
    pub fn documentable_units(&self) -> u64 {
        self.files.len() as u64 + self.symbol_count()
    }
}

pub fn scan_inventory(filter: &ExclusionFilter) -> SourceInventory {
    let matcher = filter.matcher();
    let mut inventory = SourceInventory::default();

    fn walk_recursive(dir: &Path, matcher: &PathMatcher<'_>, inventory: &mut SourceInventory) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if matcher.is_excluded(&path) {
                continue;
            }
            if path.is_dir() {
                walk_recursive(&path, matcher, inventory);
            } else if path.extension().and_then(|e| e.to_str()) == Some("py") {
                count_file(&path, inventory);
                inventory.files.push(path);
            }
        }
    }

    walk_recursive(&filter.source_dir, &matcher, &mut inventory);
    inventory
}

fn count_file(path: &Path, inventory: &mut SourceInventory) {
    let Ok(source) = fs::read_to_string(path) else {
        log::debug!("skipping unreadable file {}", path.display());
        return;
    };
    for line in source.lines() {
        inventory.total_lines += 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
            inventory.function_count += 1;
        } else if trimmed.starts_with("class ") {
            inventory.class_count += 1;
        }
    }
}

/// Startup validation: the source tree must exist and contain something to
/// analyse once exclusions are applied.
pub fn open_workspace(config: &MonitorConfig) -> Result<SourceInventory> {
    if !config.source_dir.is_dir() {
        return Err(MonitorError::MissingSourceDir {
            path: config.source_dir.clone(),
        });
    }
    fs::read_dir(&config.source_dir).map_err(|e| MonitorError::io(e, &config.source_dir))?;

    let filter = ExclusionFilter::from_config(config)?;
    let inventory = scan_inventory(&filter);
    if inventory.files.is_empty() {
        return Err(MonitorError::Config(format!(
            "No Python files found in {} (files may be excluded by patterns in config)",
            config.source_dir.display()
        )));
    }
    Ok(inventory)
}

/// Finds the nearest `tests/` directory at or above the source directory.
/// Returns `(tests_dir, project_root)`.
pub fn find_test_directory(source_dir: &Path) -> Option<(PathBuf, PathBuf)> {
    let mut current = source_dir.to_path_buf();
    for _ in 0..TEST_DIR_SEARCH_DEPTH {
        let candidate = current.join("tests");
        if candidate.is_dir() {
            return Some((candidate, current));
        }
        if !current.pop() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn sample_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "pkg/a.py", "def f():\n    pass\n\nclass C:\n    async def m(self):\n        pass\n");
        write(tmp.path(), "pkg/migrations/0001.py", "def up():\n    pass\n");
        write(tmp.path(), "pkg/__pycache__/a.cpython.py", "def cached():\n    pass\n");
        write(tmp.path(), "pkg/notes.txt", "def not_python():\n");
        tmp
    }

    #[test]
    fn inventory_counts_lines_and_declarations() {
        let tmp = sample_tree();
        let source = tmp.path().join("pkg");
        let filter = ExclusionFilter::new(&source, tmp.path(), &[], false).unwrap();
        let inventory = scan_inventory(&filter);

        assert_eq!(inventory.files.len(), 2);
        assert_eq!(inventory.total_lines, 8);
        assert_eq!(inventory.function_count, 3);
        assert_eq!(inventory.class_count, 1);
        assert_eq!(inventory.documentable_units(), 6);
    }

    #[test]
    fn configured_patterns_match_any_path_component() {
        let tmp = sample_tree();
        let source = tmp.path().join("pkg");
        let filter =
            ExclusionFilter::new(&source, tmp.path(), &["migrations".to_string()], false).unwrap();
        let inventory = scan_inventory(&filter);
        assert_eq!(inventory.files.len(), 1);

        let matcher = filter.matcher();
        assert!(matcher.is_excluded(&source.join("migrations/0001.py")));
        assert!(matcher.is_excluded_str("pkg/migrations/0001.py"));
        assert!(!matcher.is_excluded(&source.join("a.py")));
    }

    #[test]
    fn root_ignore_file_is_read_outside_a_repository() {
        let tmp = sample_tree();
        let source = tmp.path().join("pkg");
        write(&source, ".gitignore", "# generated\nmigrations/\n");
        let filter = ExclusionFilter::new(&source, tmp.path(), &[], true).unwrap();
        // The temp dir may itself live inside a repository on some machines;
        // only assert when it does not.
        if Repository::discover(&source).is_err() {
            assert_eq!(scan_inventory(&filter).files.len(), 1);
        }
    }

    #[test]
    fn git_ignore_rules_apply_inside_a_repository() {
        let tmp = sample_tree();
        Repository::init(tmp.path()).unwrap();
        write(tmp.path(), ".gitignore", "migrations\n");
        let source = tmp.path().join("pkg");
        let filter = ExclusionFilter::new(&source, tmp.path(), &[], true).unwrap();

        let inventory = scan_inventory(&filter);
        assert_eq!(inventory.files.len(), 1);
        assert!(inventory.files[0].ends_with("a.py"));
    }

    #[test]
    fn tool_patterns_add_common_ignores_without_duplicates() {
        let filter = ExclusionFilter::new(
            Path::new("/tmp/src"),
            Path::new("/tmp"),
            &["build".to_string(), "legacy_*".to_string()],
            true,
        )
        .unwrap();
        let patterns = filter.tool_patterns();
        assert_eq!(patterns[0], "build");
        assert_eq!(patterns[1], "legacy_*");
        assert_eq!(patterns.iter().filter(|p| *p == "build").count(), 1);
        assert!(patterns.contains(&"__pycache__".to_string()));

        let plain = ExclusionFilter::new(Path::new("/tmp/src"), Path::new("/tmp"), &[], false).unwrap();
        assert!(plain.tool_patterns().is_empty());
    }

    #[test]
    fn invalid_glob_is_a_configuration_error() {
        let result = ExclusionFilter::new(Path::new("/tmp/src"), Path::new("/tmp"), &["[".to_string()], false);
        assert!(matches!(result, Err(MonitorError::Pattern(_))));
    }

    #[test]
    fn open_workspace_rejects_missing_or_empty_trees() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = MonitorConfig::new(tmp.path().join("nope"), tmp.path());
        assert!(matches!(open_workspace(&missing), Err(MonitorError::MissingSourceDir { .. })));

        let mut empty = MonitorConfig::new(tmp.path(), tmp.path());
        empty.respect_gitignore = false;
        assert!(matches!(open_workspace(&empty), Err(MonitorError::Config(_))));
    }

    #[test]
    fn finds_tests_directory_above_source() {
        let tmp = sample_tree();
        fs::create_dir_all(tmp.path().join("tests")).unwrap();
        let (tests, root) = find_test_directory(&tmp.path().join("pkg")).unwrap();
        assert_eq!(tests, tmp.path().join("tests"));
        assert_eq!(root, tmp.path().to_path_buf());
    }
}
