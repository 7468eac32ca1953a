//! Python chunking and relationship extraction.

use std::path::Path;

use tree_sitter::{Language, Node, Parser, Tree};

use super::RelationshipExtractor;
use crate::config::{chunk_id, Chunk, ChunkKind, RelationshipEdge, RelationshipType};
use crate::error::{GraphError, Result};
use crate::resolve::annotations::{resolve_parameter_types, resolve_return_type};
use crate::resolve::cache::{base_classes, FileContextCache};
use crate::resolve::context::ResolutionContext;
use crate::resolve::imports::statement_bindings;
use crate::resolve::node_text;

/// Every edge of this extractor is exact syntax, not a guess.
const CONFIDENCE: f64 = 1.0;

/// Parse Python source with tree-sitter.
pub fn parse_source(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    let language: Language = tree_sitter_python::LANGUAGE.into();
    parser.set_language(&language).ok()?;
    parser.parse(source, None)
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Split a Python file into function, class, method and module chunks.
///
/// Top-level functions and classes become chunks, methods of top-level
/// classes become chunks owned by their class, and a module chunk is emitted
/// when the file has module-level statements besides definitions.
pub fn chunk_file(rel_path: &str, abs_path: &Path, source: &str) -> Result<Vec<Chunk>> {
    let tree = parse_source(source).ok_or_else(|| GraphError::ParseFailure {
        chunk_id: rel_path.to_string(),
        reason: "tree-sitter returned no tree".to_string(),
    })?;
    let root = tree.root_node();
    let bytes = source.as_bytes();
    let rel_path = rel_path.replace('\\', "/");

    let make = |node: &Node, kind: ChunkKind, name: &str, parent: Option<(&str, &str)>| {
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;
        Chunk {
            id: chunk_id(
                &rel_path,
                start_line,
                end_line,
                kind,
                parent.map(|(p, _)| p),
                Some(name),
            ),
            name: name.to_string(),
            kind,
            file: rel_path.clone(),
            abs_path: abs_path.to_path_buf(),
            language: "python".to_string(),
            start_line,
            end_line,
            parent_name: parent.map(|(p, _)| p.to_string()),
            parent_chunk_id: parent.map(|(_, id)| id.to_string()),
            content: dedent(node, source),
        }
    };

    let mut chunks = Vec::new();
    let mut has_module_code = false;

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else {
            continue;
        };
        let Some(def) = definition_of(&child) else {
            if child.is_named() && child.kind() != "comment" {
                has_module_code = true;
            }
            continue;
        };
        let Some(name) = def.child_by_field_name("name").map(|n| node_text(&n, bytes)) else {
            continue;
        };

        if def.kind() == "function_definition" {
            chunks.push(make(&child, ChunkKind::Function, name, None));
            continue;
        }

        let class_chunk = make(&child, ChunkKind::Class, name, None);
        let class_id = class_chunk.id.clone();
        chunks.push(class_chunk);

        let Some(body) = def.child_by_field_name("body") else {
            continue;
        };
        for j in 0..body.child_count() {
            let Some(member) = body.child(j) else {
                continue;
            };
            let Some(method) = definition_of(&member) else {
                continue;
            };
            if method.kind() != "function_definition" {
                continue;
            }
            if let Some(method_name) = method.child_by_field_name("name") {
                chunks.push(make(
                    &member,
                    ChunkKind::Method,
                    node_text(&method_name, bytes),
                    Some((name, class_id.as_str())),
                ));
            }
        }
    }

    if has_module_code {
        let end = root.end_position();
        let end_line = (if end.column == 0 { end.row } else { end.row + 1 }).max(1);
        let stem = Path::new(&rel_path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        chunks.insert(
            0,
            Chunk {
                id: chunk_id(&rel_path, 1, end_line, ChunkKind::Module, None, None),
                name: stem,
                kind: ChunkKind::Module,
                file: rel_path.clone(),
                abs_path: abs_path.to_path_buf(),
                language: "python".to_string(),
                start_line: 1,
                end_line,
                parent_name: None,
                parent_chunk_id: None,
                content: source.to_string(),
            },
        );
    }

    Ok(chunks)
}

/// The function or class definition a statement introduces, looking through
/// decorators.
fn definition_of<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    match node.kind() {
        "function_definition" | "class_definition" => Some(*node),
        "decorated_definition" => node.child_by_field_name("definition"),
        _ => None,
    }
}

/// Node text with the node's own indentation removed from continuation
/// lines, so a method parses as a top-level definition.
fn dedent(node: &Node, source: &str) -> String {
    let text = &source[node.start_byte()..node.end_byte()];
    let indent = node.start_position().column;
    if indent == 0 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
            let strip = line
                .bytes()
                .take(indent)
                .take_while(|b| *b == b' ' || *b == b'\t')
                .count();
            out.push_str(&line[strip..]);
        } else {
            out.push_str(line);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Relationship extraction
// ---------------------------------------------------------------------------

/// Heuristic Python relationship extractor.
pub struct PythonExtractor;

impl RelationshipExtractor for PythonExtractor {
    fn extract_relationships(
        &self,
        chunk: &Chunk,
        cache: &FileContextCache,
    ) -> Result<Vec<RelationshipEdge>> {
        let tree = parse_source(&chunk.content).ok_or_else(|| GraphError::ParseFailure {
            chunk_id: chunk.id.clone(),
            reason: "tree-sitter returned no tree".to_string(),
        })?;
        let root = tree.root_node();
        let source = chunk.content.as_bytes();

        let file = cache.get_or_build(&chunk.abs_path, &chunk.content);
        let ctx = ResolutionContext::build(file, &root, source, chunk.parent_name.as_deref());

        let mut walker = EdgeWalker {
            chunk,
            source,
            classes: ctx.enclosing_class().map(str::to_string).into_iter().collect(),
            ctx,
            edges: Vec::new(),
            // Only function and method chunks own a signature.
            signature_seen: !matches!(chunk.kind, ChunkKind::Function | ChunkKind::Method),
        };
        walker.walk(&root, 0);
        Ok(walker.edges)
    }
}

struct EdgeWalker<'a> {
    chunk: &'a Chunk,
    source: &'a [u8],
    ctx: ResolutionContext,
    /// Innermost class last; `self`/`cls` resolve against the top.
    classes: Vec<String>,
    edges: Vec<RelationshipEdge>,
    signature_seen: bool,
}

impl EdgeWalker<'_> {
    fn walk(&mut self, node: &Node, depth: usize) {
        match node.kind() {
            // Decorators are never calls.
            "decorator" => return,
            "function_definition" | "class_definition" | "decorated_definition"
                if depth == 1 && self.chunk.kind == ChunkKind::Module =>
            {
                // Definitions are chunks of their own.
                return;
            }
            "class_definition" => {
                self.class_definition(node, depth);
                return;
            }
            "function_definition" => {
                if !self.signature_seen {
                    self.signature_seen = true;
                    self.signature_types(node);
                }
                self.ctx.enter_function(node, self.source);
                self.walk_children(node, depth);
                self.ctx.exit_scope();
                return;
            }
            "call" => self.call(node),
            "raise_statement" => self.raise(node),
            "except_clause" | "except_group_clause" => self.except(node),
            "import_statement" | "import_from_statement" => self.import(node),
            _ => {}
        }
        self.walk_children(node, depth);
    }

    fn walk_children(&mut self, node: &Node, depth: usize) {
        for i in 0..node.child_count() {
            if let Some(child) = node.child(i) {
                self.walk(&child, depth + 1);
            }
        }
    }

    fn push(&mut self, target: String, kind: RelationshipType, node: &Node, is_method_call: bool) {
        if target.is_empty() {
            return;
        }
        self.edges.push(RelationshipEdge {
            source_id: self.chunk.id.clone(),
            target,
            relationship_type: kind,
            line_number: self.chunk.start_line + node.start_position().row,
            confidence: CONFIDENCE,
            is_method_call,
        });
    }

    fn class_definition(&mut self, node: &Node, depth: usize) {
        for base in base_classes(node, self.source, self.ctx.import_map()) {
            self.push(base, RelationshipType::Inherits, node, false);
        }
        let name = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, self.source).to_string());
        let pushed = name.is_some();
        if let Some(name) = name {
            self.classes.push(name);
        }
        self.ctx.enter_class(node, self.source);
        self.walk_children(node, depth);
        self.ctx.exit_scope();
        if pushed {
            self.classes.pop();
        }
    }

    fn signature_types(&mut self, function: &Node) {
        let params = resolve_parameter_types(function, self.source);
        let mut seen: Vec<String> = Vec::new();
        let annotated = params
            .into_values()
            .chain(resolve_return_type(function, self.source));
        for ty in annotated {
            let ty = self.ctx.unalias(&ty).to_string();
            if !seen.contains(&ty) {
                seen.push(ty.clone());
                self.push(ty, RelationshipType::UsesType, function, false);
            }
        }
    }

    fn call(&mut self, node: &Node) {
        let Some(mut function) = node.child_by_field_name("function") else {
            return;
        };
        while function.kind() == "parenthesized_expression" {
            match function.named_child(0) {
                Some(inner) => function = inner,
                None => return,
            }
        }
        let (target, is_method_call) = match function.kind() {
            "identifier" => {
                let name = node_text(&function, self.source);
                (self.ctx.unalias(name).to_string(), false)
            }
            "attribute" => {
                let (Some(receiver), Some(method)) = (
                    function.child_by_field_name("object"),
                    function.child_by_field_name("attribute"),
                ) else {
                    return;
                };
                let method = node_text(&method, self.source);
                (self.resolve_method(&receiver, method), true)
            }
            "call" => ("call_result".to_string(), false),
            "subscript" => ("subscript_result".to_string(), false),
            "lambda" => ("lambda".to_string(), false),
            _ => return,
        };
        self.push(target, RelationshipType::Calls, node, is_method_call);
    }

    /// Resolve `receiver.method`; the first rule that applies wins.
    fn resolve_method(&self, receiver: &Node, method: &str) -> String {
        let current_class = self.classes.last().map(String::as_str);

        match receiver.kind() {
            "identifier" => {
                let name = node_text(receiver, self.source);
                if name == "self" || name == "cls" {
                    if let Some(class) = current_class {
                        return format!("{class}.{method}");
                    }
                }
                if let Some(ty) = self.ctx.type_of(name) {
                    return format!("{}.{method}", self.ctx.unalias(ty));
                }
                if let Some(binding) = self.ctx.import(name) {
                    return format!("{}.{method}", binding.symbol);
                }
            }
            "call" if self.is_super_call(receiver) => {
                // First base wins: a documented MRO approximation.
                return match current_class.and_then(|c| self.ctx.first_base(c)) {
                    Some(base) => format!("{base}.{method}"),
                    None => format!("super.{method}"),
                };
            }
            "attribute" => {
                let key: String = node_text(receiver, self.source)
                    .split_whitespace()
                    .collect();
                if let Some(ty) = self.ctx.type_of(&key) {
                    return format!("{}.{method}", self.ctx.unalias(ty));
                }
                if let Some(binding) = self.ctx.import(&key) {
                    return format!("{}.{method}", binding.symbol);
                }
            }
            _ => {}
        }
        method.to_string()
    }

    fn is_super_call(&self, call: &Node) -> bool {
        call.child_by_field_name("function")
            .is_some_and(|f| f.kind() == "identifier" && node_text(&f, self.source) == "super")
    }

    fn raise(&mut self, node: &Node) {
        let Some(expr) = node.named_child(0) else {
            return;
        };
        let target = match expr.kind() {
            "call" => expr
                .child_by_field_name("function")
                .and_then(|f| self.exception_name(&f)),
            _ => self.exception_name(&expr),
        };
        if let Some(target) = target {
            self.push(target, RelationshipType::Raises, node, false);
        }
    }

    fn except(&mut self, node: &Node) {
        let mut cursor = node.walk();
        let Some(expr) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() != "block" && c.kind() != "comment")
        else {
            return;
        };
        let mut names = Vec::new();
        self.exception_names(&expr, &mut names);
        for name in names {
            self.push(name, RelationshipType::Catches, node, false);
        }
    }

    fn exception_names(&self, node: &Node, out: &mut Vec<String>) {
        match node.kind() {
            "tuple" | "parenthesized_expression" | "expression_list" => {
                for i in 0..node.named_child_count() {
                    if let Some(child) = node.named_child(i) {
                        self.exception_names(&child, out);
                    }
                }
            }
            // `except E as e` in grammars that model it as a pattern.
            "as_pattern" => {
                if let Some(inner) = node.named_child(0) {
                    self.exception_names(&inner, out);
                }
            }
            _ => {
                if let Some(name) = self.exception_name(node) {
                    out.push(name);
                }
            }
        }
    }

    fn exception_name(&self, node: &Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.ctx.unalias(node_text(node, self.source)).to_string()),
            "attribute" => node
                .child_by_field_name("attribute")
                .map(|a| node_text(&a, self.source).to_string()),
            _ => None,
        }
    }

    fn import(&mut self, node: &Node) {
        let bindings = statement_bindings(node, self.source);
        let qualified: Vec<&str> = bindings
            .iter()
            .map(|(_, b)| b.qualified_name.as_str())
            .collect();
        let mut targets: Vec<String> = Vec::new();
        for q in &qualified {
            // `import os.path` binds `os` too; report only the full path.
            let is_prefix = qualified
                .iter()
                .any(|other| other.len() > q.len() && other.starts_with(&format!("{q}.")));
            if !is_prefix && !targets.iter().any(|t| t == q) {
                targets.push((*q).to_string());
            }
        }
        for target in targets {
            self.push(target, RelationshipType::Imports, node, false);
        }
    }
}
