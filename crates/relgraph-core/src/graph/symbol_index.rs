//! Qualified-name lookup from extracted edge targets to chunk ids.

use std::collections::HashMap;

use crate::config::{Chunk, ChunkKind};

/// Dual HashMap for target lookups.
///
/// - `file_index`: file path → qualified name → chunk id
/// - `global_index`: qualified name → chunk ids, in insertion order
///
/// Qualified names are `Class.method` for methods and the bare name for
/// functions and classes; module chunks are not indexed.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    file_index: HashMap<String, HashMap<String, String>>,
    global_index: HashMap<String, Vec<String>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Self {
        let mut index = Self::new();
        for chunk in chunks {
            index.add(chunk);
        }
        index
    }

    pub fn add(&mut self, chunk: &Chunk) {
        let Some(qualified) = qualified_name(chunk) else {
            return;
        };
        self.file_index
            .entry(chunk.file.clone())
            .or_default()
            .insert(qualified.clone(), chunk.id.clone());
        let ids = self.global_index.entry(qualified).or_default();
        if !ids.contains(&chunk.id) {
            ids.push(chunk.id.clone());
        }
    }

    /// Chunk id an edge target should attach to. A name defined exactly once
    /// resolves globally; an ambiguous name resolves only to a definition in
    /// `from_file`. Anything else stays a phantom.
    pub fn resolve(&self, target: &str, from_file: &str) -> Option<&str> {
        match self.global_index.get(target).map(Vec::as_slice) {
            Some([only]) => Some(only.as_str()),
            Some([_, _, ..]) => self.lookup_exact(from_file, target),
            _ => None,
        }
    }

    /// Definition of `name` inside one file.
    pub fn lookup_exact(&self, file: &str, name: &str) -> Option<&str> {
        self.file_index
            .get(file)
            .and_then(|names| names.get(name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.global_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global_index.is_empty()
    }
}

fn qualified_name(chunk: &Chunk) -> Option<String> {
    match (chunk.kind, chunk.parent_name.as_deref()) {
        (ChunkKind::Module, _) => None,
        (ChunkKind::Method, Some(parent)) => Some(format!("{parent}.{}", chunk.name)),
        _ => Some(chunk.name.clone()),
    }
}
