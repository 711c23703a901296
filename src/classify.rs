//! Path classification: which acquired paths belong in the corpus.
//!
//! The built-in policy is fixed: skip-directories prune whole subtrees,
//! hidden files are dropped, and a file is kept when its extension is a
//! known source/config/markup type or when it has no extension at all
//! (`Dockerfile`, `Makefile`, `LICENSE`). User exclude globs from
//! `[limits].exclude_globs` narrow the result further.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Extensions accepted into the corpus (compared lowercased).
pub const CODE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "py", "rb", "go", "java", "kt", "swift", "c", "cpp", "h", "hpp",
    "cs", "php", "rs", "scala", "sh", "bash", "yaml", "yml", "json", "toml", "env", "md", "mdx",
    "sql", "graphql", "html", "css", "scss", "sass", "vue", "svelte", "astro", "dockerfile",
    "makefile", "gitignore",
];

/// Directory names whose entire subtree is excluded (compared lowercased).
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".next",
    "dist",
    "build",
    ".venv",
    "venv",
    "env",
    ".env",
    "coverage",
    ".nyc_output",
    "vendor",
    ".cargo",
    "target",
    ".gradle",
];

/// Built-in inclusion predicate. Pure and total.
pub fn includes(path: &str) -> bool {
    let parts: Vec<&str> = path.split('/').collect();
    let (filename, dirs) = match parts.split_last() {
        Some(split) => split,
        None => return false,
    };

    if dirs
        .iter()
        .any(|dir| SKIP_DIRS.contains(&dir.to_lowercase().as_str()))
    {
        return false;
    }

    if filename.is_empty() || filename.starts_with('.') {
        return false;
    }

    if !filename.contains('.') {
        return true;
    }
    let ext = extension(filename);
    CODE_EXTENSIONS.contains(&ext.as_str())
}

/// Lowercased substring after the last `.`, or empty when there is none.
fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

/// The built-in predicate plus optional user exclude globs.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    excludes: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(exclude_globs: &[String]) -> Result<Self> {
        if exclude_globs.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            excludes: Some(build_globset(exclude_globs)?),
        })
    }

    pub fn includes(&self, path: &str) -> bool {
        if !includes(path) {
            return false;
        }
        match &self.excludes {
            Some(set) => !set.is_match(path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_known_extensions() {
        assert!(includes("src/main.rs"));
        assert!(includes("proj/app/Component.TSX"));
        assert!(includes("README.md"));
    }

    #[test]
    fn test_accepts_extensionless_files() {
        assert!(includes("Dockerfile"));
        assert!(includes("proj/Makefile"));
        assert!(includes("LICENSE"));
    }

    #[test]
    fn test_rejects_unknown_extensions() {
        assert!(!includes("logo.png"));
        assert!(!includes("archive.tar.gz"));
        assert!(!includes("notes.txt"));
    }

    #[test]
    fn test_rejects_skip_dirs_case_insensitively() {
        assert!(!includes("proj/node_modules/x.js"));
        assert!(!includes("proj/Node_Modules/x.js"));
        assert!(!includes("a/b/TARGET/debug/build.rs"));
        assert!(!includes(".git/config"));
    }

    #[test]
    fn test_skip_dir_name_as_file_is_kept() {
        // Only directory components are checked against the skip-set.
        assert!(includes("proj/build"));
    }

    #[test]
    fn test_rejects_hidden_and_empty_names() {
        assert!(!includes(".gitignore"));
        assert!(!includes("proj/.env"));
        assert!(!includes("proj/"));
        assert!(!includes(""));
    }

    #[test]
    fn test_filter_applies_user_excludes() {
        let filter = PathFilter::new(&["**/*.json".to_string()]).unwrap();
        assert!(!filter.includes("proj/package.json"));
        assert!(filter.includes("proj/index.js"));
        assert!(!filter.includes("proj/dist/index.js"));
    }

    #[test]
    fn test_default_filter_is_builtin_predicate() {
        let filter = PathFilter::default();
        assert!(filter.includes("a.py"));
        assert!(!filter.includes("venv/a.py"));
    }
}
