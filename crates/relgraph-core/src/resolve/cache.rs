//! Per-file resolution data shared read-only across chunk extractions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tree_sitter::Node;

use super::imports::{resolve_imports, ImportMap};
use super::{last_segment, node_text};
use crate::languages::python::parse_source;

/// File-level maps computed from a whole source file.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    pub imports: ImportMap,
    /// Class name -> base class names, in declaration order.
    pub class_bases: HashMap<String, Vec<String>>,
}

impl FileContext {
    /// Parse `source` and build its file-level maps. Unparsable input yields
    /// empty maps.
    pub fn from_source(source: &str) -> Self {
        let Some(tree) = parse_source(source) else {
            return Self::default();
        };
        let root = tree.root_node();
        let bytes = source.as_bytes();
        let imports = resolve_imports(&root, bytes);
        let mut class_bases = HashMap::new();
        collect_class_bases(&root, bytes, &imports, &mut class_bases);
        Self {
            imports,
            class_bases,
        }
    }
}

/// First pass over every class definition: name -> bases.
pub fn collect_class_bases(
    node: &Node,
    source: &[u8],
    imports: &ImportMap,
    out: &mut HashMap<String, Vec<String>>,
) {
    if node.kind() == "class_definition" {
        if let Some(name) = node.child_by_field_name("name") {
            out.insert(
                node_text(&name, source).to_string(),
                base_classes(node, source, imports),
            );
        }
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_class_bases(&child, source, imports, out);
        }
    }
}

/// Base class names of one class definition. Keyword arguments such as
/// `metaclass=` are skipped.
pub fn base_classes(class_node: &Node, source: &[u8], imports: &ImportMap) -> Vec<String> {
    let Some(args) = class_node.child_by_field_name("superclasses") else {
        return Vec::new();
    };
    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter_map(|arg| base_name(&arg, source, imports))
        .collect()
}

fn base_name(node: &Node, source: &[u8], imports: &ImportMap) -> Option<String> {
    let name = match node.kind() {
        "identifier" => {
            let name = node_text(node, source);
            match imports.get(name) {
                Some(binding) => binding.type_name().to_string(),
                None => name.to_string(),
            }
        }
        "attribute" => {
            let attr = node.child_by_field_name("attribute")?;
            node_text(&attr, source).to_string()
        }
        // Generic[T], Base[int]
        "subscript" => base_name(&node.child_by_field_name("value")?, source, imports)?,
        _ => return None,
    };
    let name = last_segment(&name);
    (!name.is_empty()).then(|| name.to_string())
}

/// Cache of [`FileContext`] keyed by absolute file path.
///
/// Lookups never block on a global lock. Two threads missing the same file at
/// once may both compute it; the first insert wins and both see equal data.
#[derive(Debug, Default)]
pub struct FileContextCache {
    entries: DashMap<PathBuf, Arc<FileContext>>,
}

impl FileContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `path`, reading the file on first use. When the file cannot
    /// be read, `fallback` (usually the chunk text) stands in for it.
    pub fn get_or_build(&self, path: &Path, fallback: &str) -> Arc<FileContext> {
        if let Some(existing) = self.entries.get(path) {
            return Arc::clone(existing.value());
        }
        let built = match std::fs::read_to_string(path) {
            Ok(source) => FileContext::from_source(&source),
            Err(e) => {
                log::debug!("Using chunk text for {}: {e}", path.display());
                FileContext::from_source(fallback)
            }
        };
        let entry = self
            .entries
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(built));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
