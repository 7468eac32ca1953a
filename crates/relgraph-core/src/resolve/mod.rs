//! Name and type resolvers feeding the relationship extractor.
//!
//! Every resolver is a pure function of a parse tree: the import resolver runs
//! over a whole file, the annotation resolver over one function signature and
//! the assignment tracker over one chunk. Their outputs are combined into a
//! [`context::ResolutionContext`] that lives for exactly one extraction call.

use tree_sitter::Node;

pub mod annotations;
pub mod assignments;
pub mod cache;
pub mod context;
pub mod imports;

/// UTF-8 text of a node, empty when the bytes are not valid UTF-8.
pub(crate) fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Last segment of a dotted name (`pkg.mod.Class` -> `Class`).
pub(crate) fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
