//! Path filtering using .gitignore-style patterns
//!
//! Architectural Principle: Service Layer - PathFilter orchestrates complex path matching logic
//! - Encapsulates the rules for include/exclude pattern evaluation
//! - Patterns are always matched against paths relative to the audited root
//! - Handles .layerguardianignore file discovery and parsing

use crate::domain::violations::{GuardianError, GuardianResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Manages path filtering using .gitignore-style patterns
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Include/exclude patterns
    patterns: Vec<FilterPattern>,
    /// Name of ignore files to process, if enabled
    ignore_filename: Option<String>,
}

/// A single path filter pattern
#[derive(Debug, Clone)]
struct FilterPattern {
    /// The glob, without `!`, leading `/` or trailing `/`
    pattern: glob::Pattern,
    /// Whether this is an include pattern (starts with !)
    is_include: bool,
    /// Pattern ends with `/` and only matches directories
    dir_only: bool,
    /// Pattern contains a `/` and is matched against the whole relative path
    anchored: bool,
}

impl FilterPattern {
    fn parse(raw: &str) -> Result<Self, glob::PatternError> {
        let (is_include, rest) = match raw.strip_prefix('!') {
            Some(stripped) => (true, stripped),
            None => (false, raw),
        };
        let dir_only = rest.ends_with('/');
        let trimmed = rest.trim_end_matches('/');
        let anchored = trimmed.contains('/');
        let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);

        Ok(Self { pattern: glob::Pattern::new(trimmed)?, is_include, dir_only, anchored })
    }

    /// Check the pattern against a relative path split into components
    fn matches(&self, components: &[String]) -> bool {
        if components.is_empty() {
            return false;
        }

        if self.dir_only {
            // Any ancestor directory of the file
            return (1..components.len()).any(|end| self.matches_prefix(&components[..end]));
        }

        self.matches_prefix(components)
    }

    fn matches_prefix(&self, components: &[String]) -> bool {
        if self.anchored {
            self.pattern.matches(&components.join("/"))
        } else {
            components.last().map(|name| self.pattern.matches(name)).unwrap_or(false)
        }
    }
}

impl PathFilter {
    /// Create a new path filter with the given patterns
    pub fn new(patterns: Vec<String>, ignore_filename: Option<String>) -> GuardianResult<Self> {
        let mut filter_patterns = Vec::new();

        for pattern_str in patterns {
            let pattern = FilterPattern::parse(&pattern_str).map_err(|e| {
                GuardianError::pattern(format!("Invalid pattern '{pattern_str}': {e}"))
            })?;
            filter_patterns.push(pattern);
        }

        Ok(Self { patterns: filter_patterns, ignore_filename })
    }

    /// Check if a relative path should be analyzed by the configured patterns alone
    pub fn should_analyze(&self, relative: &Path) -> bool {
        let components = relative_components(relative);
        apply_patterns(&self.patterns, &components)
    }

    /// Load patterns from a .layerguardianignore file
    fn load_ignore_file(path: &Path) -> GuardianResult<Vec<FilterPattern>> {
        let content = fs::read_to_string(path).map_err(|e| {
            GuardianError::config(format!("Failed to read ignore file '{}': {}", path.display(), e))
        })?;

        let mut patterns = Vec::new();

        for line in content.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match FilterPattern::parse(line) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => {
                    // Log warning but don't fail - just skip invalid patterns
                    tracing::warn!("Invalid pattern '{}' in {}: {}", line, path.display(), e);
                }
            }
        }

        Ok(patterns)
    }

    /// All `.rs` files under `root` that should be analyzed, as relative paths in sorted order
    pub fn find_rust_files(&self, root: &Path) -> GuardianResult<Vec<PathBuf>> {
        let mut ignore_cache: HashMap<PathBuf, Vec<FilterPattern>> = HashMap::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("rs")
            {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            if !self.should_analyze(&relative) {
                continue;
            }

            if self.is_ignored_by_files(root, &relative, &mut ignore_cache)? {
                continue;
            }

            files.push(relative);
        }

        files.sort();
        Ok(files)
    }

    /// Check ignore files from the root down to the file's directory; deeper files win
    fn is_ignored_by_files(
        &self,
        root: &Path,
        relative: &Path,
        cache: &mut HashMap<PathBuf, Vec<FilterPattern>>,
    ) -> GuardianResult<bool> {
        let Some(ignore_filename) = &self.ignore_filename else {
            return Ok(false);
        };

        let components = relative_components(relative);
        let mut is_ignored = false;

        for depth in 0..components.len() {
            let dir: PathBuf = components[..depth].iter().collect();
            if !cache.contains_key(&dir) {
                let ignore_file = root.join(&dir).join(ignore_filename);
                let loaded = if ignore_file.is_file() {
                    Self::load_ignore_file(&ignore_file)?
                } else {
                    Vec::new()
                };
                cache.insert(dir.clone(), loaded);
            }
            let patterns = &cache[&dir];

            // Make path relative to the ignore file's directory
            let local = &components[depth..];
            for pattern in patterns {
                if pattern.matches(local) {
                    is_ignored = !pattern.is_include;
                }
            }
        }

        Ok(is_ignored)
    }
}

/// Apply patterns in order, like .gitignore; the last match decides
fn apply_patterns(patterns: &[FilterPattern], components: &[String]) -> bool {
    let mut should_include = true;
    for pattern in patterns {
        if pattern.matches(components) {
            should_include = pattern.is_include;
        }
    }
    should_include
}

fn relative_components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter(patterns: &[&str]) -> PathFilter {
        PathFilter::new(patterns.iter().map(|p| p.to_string()).collect(), None).unwrap()
    }

    #[test]
    fn test_basic_pattern_matching() {
        let filter = filter(&["target/", "*.generated.rs"]);

        assert!(filter.should_analyze(Path::new("src/lib.rs")));
        assert!(!filter.should_analyze(Path::new("target/debug/build.rs")));
        assert!(!filter.should_analyze(Path::new("src/schema.generated.rs")));
    }

    #[test]
    fn test_include_override() {
        let filter = filter(&["**/tests/", "!**/tests/contract.rs"]);

        assert!(!filter.should_analyze(Path::new("crates/core/tests/unit.rs")));
        assert!(filter.should_analyze(Path::new("crates/core/tests/contract.rs")));
    }

    #[test]
    fn test_directory_pattern_does_not_match_file_name() {
        let filter = filter(&["domain/"]);

        assert!(!filter.should_analyze(Path::new("src/domain/user.rs")));
        assert!(filter.should_analyze(Path::new("src/domain.rs")));
    }

    #[test]
    fn test_invalid_pattern_handling() {
        assert!(PathFilter::new(vec!["[invalid".to_string()], None).is_err());
    }

    #[test]
    fn test_find_rust_files_with_ignore_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src/generated")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join(".layerguardianignore"), "generated/\n").unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("src/b.rs"), "").unwrap();
        fs::write(root.join("src/a.rs"), "").unwrap();
        fs::write(root.join("src/notes.md"), "").unwrap();
        fs::write(root.join("src/generated/schema.rs"), "").unwrap();
        fs::write(root.join("target/debug/out.rs"), "").unwrap();

        let filter =
            PathFilter::new(vec!["target/".to_string()], Some(".layerguardianignore".to_string()))
                .unwrap();
        let files = filter.find_rust_files(root).unwrap();

        assert_eq!(
            files,
            vec![
                PathBuf::from("src/a.rs"),
                PathBuf::from("src/b.rs"),
                PathBuf::from("src/lib.rs"),
            ]
        );
    }

    #[test]
    fn test_nested_ignore_file_is_relative_to_its_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("src/legacy")).unwrap();
        fs::write(root.join("src/.layerguardianignore"), "legacy/*.rs\n").unwrap();
        fs::write(root.join("src/legacy/old.rs"), "").unwrap();
        fs::write(root.join("src/new.rs"), "").unwrap();

        let filter = PathFilter::new(vec![], Some(".layerguardianignore".to_string())).unwrap();
        let files = filter.find_rust_files(root).unwrap();

        assert_eq!(files, vec![PathBuf::from("src/new.rs")]);
    }
}
