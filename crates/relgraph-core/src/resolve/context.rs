//! Per-extraction resolution state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tree_sitter::Node;

use super::annotations::resolve_parameter_types;
use super::assignments::track_assignments;
use super::cache::{collect_class_bases, FileContext};
use super::imports::{ImportBinding, ImportMap};
use super::node_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class,
    Function,
}

/// Variable types visible in one lexical scope.
#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    types: BTreeMap<String, String>,
}

/// Scratch state for resolving one chunk. Built fresh for every extraction
/// call and dropped afterwards; only the [`FileContext`] is shared.
///
/// Variable types live in a stack of scopes that the extractor pushes and
/// pops as it enters function and class bodies, so a name typed in one
/// function never resolves a receiver in another.
#[derive(Debug)]
pub struct ResolutionContext {
    file: Arc<FileContext>,
    enclosing_class: Option<String>,
    /// Classes defined inside the chunk itself, consulted before the file map.
    local_bases: HashMap<String, Vec<String>>,
    /// Module scope first, innermost last. Never empty.
    scopes: Vec<Scope>,
}

impl ResolutionContext {
    /// Build the context for a chunk rooted at `root`. Only the top-level
    /// scope of the chunk is tracked here; nested bodies are tracked when
    /// entered.
    pub fn build(
        file: Arc<FileContext>,
        root: &Node,
        source: &[u8],
        enclosing_class: Option<&str>,
    ) -> Self {
        let module = Scope {
            kind: ScopeKind::Module,
            types: track_assignments(root, source, &file.imports),
        };

        let mut local_bases = HashMap::new();
        collect_class_bases(root, source, &file.imports, &mut local_bases);

        let enclosing_class = enclosing_class
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| {
                find_first(root, "class_definition")
                    .and_then(|class| class.child_by_field_name("name"))
                    .map(|name| node_text(&name, source).to_string())
            });

        Self {
            file,
            enclosing_class,
            local_bases,
            scopes: vec![module],
        }
    }

    /// Open the scope of `function`: parameter annotations first, then
    /// assignments in its body overwrite same-named parameters.
    ///
    /// `self.attr` / `cls.attr` types are also recorded on the nearest class
    /// scope so sibling methods walked later can see them.
    pub fn enter_function(&mut self, function: &Node, source: &[u8]) {
        let mut types = resolve_parameter_types(function, source);
        if let Some(body) = function.child_by_field_name("body") {
            types.extend(track_assignments(&body, source, &self.file.imports));
        }
        if let Some(class) = self.scopes.iter_mut().rev().find(|s| s.kind == ScopeKind::Class) {
            for (key, ty) in &types {
                if is_attribute_key(key) {
                    class.types.insert(key.clone(), ty.clone());
                }
            }
        }
        self.scopes.push(Scope {
            kind: ScopeKind::Function,
            types,
        });
    }

    /// Open the scope of a class body.
    pub fn enter_class(&mut self, class: &Node, source: &[u8]) {
        let types = class
            .child_by_field_name("body")
            .map(|body| track_assignments(&body, source, &self.file.imports))
            .unwrap_or_default();
        self.scopes.push(Scope {
            kind: ScopeKind::Class,
            types,
        });
    }

    /// Close the innermost scope opened by `enter_function` / `enter_class`.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Class that `self` / `cls` refer to at chunk level.
    pub fn enclosing_class(&self) -> Option<&str> {
        self.enclosing_class.as_deref()
    }

    /// First declared base of `class`: the MRO approximation used for
    /// `super()`. Not C3 linearisation.
    pub fn first_base(&self, class: &str) -> Option<&str> {
        self.local_bases
            .get(class)
            .or_else(|| self.file.class_bases.get(class))
            .and_then(|bases| bases.first())
            .map(String::as_str)
    }

    /// Known type of a variable or `self.attr` key, innermost scope first.
    ///
    /// Enclosing class bodies are skipped for plain names, as in Python; an
    /// attribute key reads the nearest class scope.
    pub fn type_of(&self, name: &str) -> Option<&str> {
        let innermost = self.scopes.len() - 1;
        let attribute = is_attribute_key(name);
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .filter(|(i, scope)| scope.kind != ScopeKind::Class || *i == innermost || attribute)
            .find_map(|(_, scope)| scope.types.get(name))
            .map(String::as_str)
    }

    pub fn import(&self, name: &str) -> Option<&ImportBinding> {
        self.file.imports.get(name)
    }

    pub fn import_map(&self) -> &ImportMap {
        &self.file.imports
    }

    /// Local name of an imported class reduced to its original name.
    pub fn unalias<'a>(&'a self, name: &'a str) -> &'a str {
        match self.file.imports.get(name) {
            Some(binding) => binding.type_name(),
            None => name,
        }
    }
}

fn is_attribute_key(key: &str) -> bool {
    key.starts_with("self.") || key.starts_with("cls.")
}

/// First node of `kind` in pre-order, including `root` itself.
pub(crate) fn find_first<'t>(root: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    if root.kind() == kind {
        return Some(*root);
    }
    for i in 0..root.child_count() {
        if let Some(child) = root.child(i) {
            if let Some(found) = find_first(&child, kind) {
                return Some(found);
            }
        }
    }
    None
}
