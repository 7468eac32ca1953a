//! Shared test helpers for integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use relgraph_core::config::{Chunk, ChunkKind, IndexConfig};
use relgraph_core::pipeline::{run_pipeline, IndexOutput};

// ---------------------------------------------------------------------------
// Fixture path resolution
// ---------------------------------------------------------------------------

/// Resolve `tests/fixtures/{name}` relative to the workspace root.
pub fn fixture_path(name: &str) -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    Path::new(manifest_dir)
        .join("../../tests/fixtures")
        .join(name)
        .canonicalize()
        .unwrap_or_else(|_| {
            Path::new(manifest_dir)
                .join("../../tests/fixtures")
                .join(name)
        })
}

/// Index config for a fixture directory, without persistence.
pub fn fixture_config(name: &str) -> IndexConfig {
    IndexConfig {
        repo_path: fixture_path(name).to_string_lossy().to_string(),
        threads: 2,
        ..IndexConfig::default()
    }
}

/// Run the whole pipeline over a fixture directory.
pub fn index_fixture(name: &str) -> IndexOutput {
    run_pipeline(&fixture_config(name), None).expect("pipeline failed")
}

// ---------------------------------------------------------------------------
// Fixture ids
// ---------------------------------------------------------------------------

pub const HANDLER_CLASS: &str = "app/handlers.py:1-3:class:ErrorHandler";
pub const HANDLE: &str = "app/handlers.py:2-3:method:ErrorHandler.handle";
pub const LOG_ERROR: &str = "app/handlers.py:6-7:function:log_error";
pub const BASE_CLASS: &str = "app/models.py:1-3:class:Base";
pub const BASE_SAVE: &str = "app/models.py:2-3:method:Base.save";
pub const USER_CLASS: &str = "app/models.py:6-8:class:User";
pub const USER_SAVE: &str = "app/models.py:7-8:method:User.save";
pub const SERVICE_MODULE: &str = "app/service.py:1-18:module";
pub const SERVICE_CLASS: &str = "app/service.py:4-13:class:Service";
pub const RUN: &str = "app/service.py:5-10:method:Service.run";
pub const WORK: &str = "app/service.py:12-13:method:Service.work";
pub const MAIN: &str = "app/service.py:16-18:function:main";

// ---------------------------------------------------------------------------
// Hand-built chunks
// ---------------------------------------------------------------------------

/// A function chunk that exists only in memory.
pub fn function_chunk(file: &str, name: &str, start: usize, end: usize) -> Chunk {
    Chunk {
        id: format!("{file}:{start}-{end}:function:{name}"),
        name: name.to_string(),
        kind: ChunkKind::Function,
        file: file.to_string(),
        abs_path: PathBuf::from("/nonexistent").join(file),
        language: "python".to_string(),
        start_line: start,
        end_line: end,
        parent_name: None,
        parent_chunk_id: None,
        content: format!("def {name}():\n    pass\n"),
    }
}
