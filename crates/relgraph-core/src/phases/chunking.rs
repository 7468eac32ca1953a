//! Phase 1: Walk the file tree and split supported source files into chunks.

use std::path::Path;

use walkdir::WalkDir;

use crate::config::{Chunk, IndexConfig};
use crate::languages::Language;

/// Default patterns to exclude from indexing.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".vs",
    ".vscode",
    ".idea",
    "dist",
    "build",
    "target",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".eggs",
    ".venv",
    "venv",
    ".env",
];

/// Run the chunking phase. Files that cannot be read or parsed are logged and
/// skipped; chunks come back ordered by file path.
pub fn run_chunking_phase(config: &IndexConfig) -> Vec<Chunk> {
    let repo_path = Path::new(&config.repo_path);
    let exclude_patterns: Vec<&str> = DEFAULT_EXCLUDES
        .iter()
        .copied()
        .chain(config.exclude_patterns.iter().map(|s| s.as_str()))
        .collect();

    let mut chunks = Vec::new();
    for entry in WalkDir::new(repo_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            if exclude_patterns.iter().any(|p| name == *p) {
                return false;
            }
            // Hidden directories, except the repo root itself
            !(e.depth() > 0 && e.file_type().is_dir() && name.starts_with('.'))
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let abs_path = entry.path();
        let Some(language) = abs_path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
        else {
            continue;
        };

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > config.max_file_size {
            log::debug!("Skipping {} ({size} bytes)", abs_path.display());
            continue;
        }

        let rel_path = abs_path
            .strip_prefix(repo_path)
            .unwrap_or(abs_path)
            .to_string_lossy()
            .replace('\\', "/");

        let source = match std::fs::read_to_string(abs_path) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("Skipping {rel_path}: {e}");
                continue;
            }
        };

        match language.chunk_file(&rel_path, abs_path, &source) {
            Ok(file_chunks) => chunks.extend(file_chunks),
            Err(e) => log::warn!("Failed to chunk {rel_path}: {e}"),
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_excluded_and_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("pkg")).unwrap();
        std::fs::create_dir_all(root.join(".venv")).unwrap();
        std::fs::create_dir_all(root.join("vendored")).unwrap();
        std::fs::write(root.join("pkg/a.py"), "def a():\n    pass\n").unwrap();
        std::fs::write(root.join(".venv/b.py"), "def b():\n    pass\n").unwrap();
        std::fs::write(root.join("vendored/c.py"), "def c():\n    pass\n").unwrap();
        std::fs::write(root.join("notes.txt"), "def d(): pass\n").unwrap();

        let config = IndexConfig {
            repo_path: root.to_string_lossy().to_string(),
            exclude_patterns: vec!["vendored".to_string()],
            ..IndexConfig::default()
        };
        let chunks = run_chunking_phase(&config);
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pkg/a.py:1-2:function:a"]);
        assert_eq!(chunks[0].abs_path, root.join("pkg/a.py"));
    }

    #[test]
    fn respects_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.py"), "x = 1\n".repeat(100)).unwrap();
        let config = IndexConfig {
            repo_path: dir.path().to_string_lossy().to_string(),
            max_file_size: 10,
            ..IndexConfig::default()
        };
        assert!(run_chunking_phase(&config).is_empty());
    }
}
