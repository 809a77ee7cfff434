//! Source file enumeration for ingestion.
//!
//! Respects `.gitignore`, a repo-level `.cgcignore` (gitignore syntax), and
//! the fixed ignore-directory list from configuration. Only files with a
//! registered extractor come back.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::parsing::Language;

pub const IGNORE_FILE_NAME: &str = ".cgcignore";

/// Enumerate source files under `root`, sorted for deterministic runs.
pub fn enumerate_source_files(root: &Path, ignore_dirs: &[String]) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .follow_links(false)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE_NAME);

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| Language::from_path(path).is_some())
        .filter(|path| !in_ignored_dir(root, path, ignore_dirs))
        .collect();
    files.sort();
    files
}

/// Repo-relative path with forward slashes (the storage form).
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn in_ignored_dir(root: &Path, path: &Path, ignore_dirs: &[String]) -> bool {
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    let Some(parent) = rel.parent() else {
        return false;
    };
    parent.components().any(|component| {
        let name = component.as_os_str().to_string_lossy().to_lowercase();
        ignore_dirs.iter().any(|d| d.to_lowercase() == name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_ignores() -> Vec<String> {
        crate::config::WorkerConfig::default().ignore_dirs
    }

    #[test]
    fn finds_supported_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("b.go"), "package main\n").unwrap();
        fs::write(dir.path().join("README.md"), "# hi\n").unwrap();

        let files = enumerate_source_files(dir.path(), &default_ignores());
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.ends_with("a.py")));
        assert!(files.iter().any(|f| f.ends_with("b.go")));
    }

    #[test]
    fn skips_ignore_dirs_and_hidden() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/index.js"), "x\n").unwrap();
        fs::write(dir.path().join(".cache/gen.py"), "x\n").unwrap();
        fs::write(dir.path().join("src/app.py"), "x = 1\n").unwrap();

        let files = enumerate_source_files(dir.path(), &default_ignores());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/app.py"));
    }

    #[test]
    fn cgcignore_patterns_apply() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(IGNORE_FILE_NAME), "generated_*.py\n").unwrap();
        fs::write(dir.path().join("generated_models.py"), "x\n").unwrap();
        fs::write(dir.path().join("models.py"), "x\n").unwrap();

        let files = enumerate_source_files(dir.path(), &default_ignores());
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("models.py"));
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("pkg").join("sub");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("mod.py");
        fs::write(&file, "x\n").unwrap();
        assert_eq!(relative_path(dir.path(), &file), "pkg/sub/mod.py");
    }
}
