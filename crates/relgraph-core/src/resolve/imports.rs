//! Whole-file import alias resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use super::{last_segment, node_text};

/// What a locally bound import name refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportBinding {
    /// Fully qualified target, relative dots preserved (`..pkg.Thing`).
    pub qualified_name: String,
    /// Original, unaliased symbol: the imported name for `from` imports,
    /// the module path for plain imports.
    pub symbol: String,
}

impl ImportBinding {
    /// Bare name usable as a type (`handlers.ErrorHandler` -> `ErrorHandler`).
    pub fn type_name(&self) -> &str {
        last_segment(&self.symbol)
    }
}

/// Local name -> binding.
pub type ImportMap = BTreeMap<String, ImportBinding>;

/// Collect module-level imports of a parsed file.
///
/// Imports nested in module-level `if`/`try` blocks count; imports inside
/// functions and classes do not. Wildcard imports contribute nothing.
pub fn resolve_imports(root: &Node, source: &[u8]) -> ImportMap {
    let mut imports = ImportMap::new();
    collect(root, source, &mut imports);
    imports
}

/// Bindings introduced by a single `import` / `from ... import` statement,
/// in the order the statement names them.
pub fn statement_bindings(statement: &Node, source: &[u8]) -> Vec<(String, ImportBinding)> {
    let mut bindings = Vec::new();
    match statement.kind() {
        "import_statement" => plain_import(statement, source, &mut bindings),
        "import_from_statement" => from_import(statement, source, &mut bindings),
        _ => {}
    }
    bindings
}

fn collect(node: &Node, source: &[u8], imports: &mut ImportMap) {
    for i in 0..node.child_count() {
        let Some(child) = node.child(i) else {
            continue;
        };
        match child.kind() {
            "import_statement" | "import_from_statement" => {
                imports.extend(statement_bindings(&child, source));
            }
            "function_definition" | "class_definition" | "decorated_definition" => {}
            _ => collect(&child, source, imports),
        }
    }
}

/// `import a.b`, `import a.b as c`
fn plain_import(node: &Node, source: &[u8], bindings: &mut Vec<(String, ImportBinding)>) {
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        match name.kind() {
            "dotted_name" => {
                let module = node_text(&name, source).to_string();
                // `import os.path` binds `os`; keep the dotted form for
                // attribute receivers like `os.path.join`.
                if let Some(root) = module.split('.').next().filter(|r| *r != module) {
                    bindings.push((
                        root.to_string(),
                        ImportBinding {
                            qualified_name: root.to_string(),
                            symbol: root.to_string(),
                        },
                    ));
                }
                bindings.push((
                    module.clone(),
                    ImportBinding {
                        qualified_name: module.clone(),
                        symbol: module,
                    },
                ));
            }
            "aliased_import" => {
                let (Some(target), Some(alias)) = (
                    name.child_by_field_name("name"),
                    name.child_by_field_name("alias"),
                ) else {
                    continue;
                };
                let module = node_text(&target, source).to_string();
                bindings.push((
                    node_text(&alias, source).to_string(),
                    ImportBinding {
                        qualified_name: module.clone(),
                        symbol: module,
                    },
                ));
            }
            _ => {}
        }
    }
}

/// `from m import X`, `from m import X as Y`, `from ..m import X`
fn from_import(node: &Node, source: &[u8], bindings: &mut Vec<(String, ImportBinding)>) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };
    let module = node_text(&module_node, source);

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let (original, local) = match name.kind() {
            "dotted_name" => {
                let text = node_text(&name, source);
                (text, text)
            }
            "aliased_import" => {
                let (Some(target), Some(alias)) = (
                    name.child_by_field_name("name"),
                    name.child_by_field_name("alias"),
                ) else {
                    continue;
                };
                (node_text(&target, source), node_text(&alias, source))
            }
            _ => continue,
        };
        if original.is_empty() || local.is_empty() {
            continue;
        }
        bindings.push((
            local.to_string(),
            ImportBinding {
                qualified_name: join_module(module, original),
                symbol: original.to_string(),
            },
        ));
    }
}

fn join_module(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::python::parse_source;

    fn imports_of(src: &str) -> ImportMap {
        let tree = parse_source(src).unwrap();
        resolve_imports(&tree.root_node(), src.as_bytes())
    }

    #[test]
    fn plain_and_aliased_imports() {
        let map = imports_of("import os\nimport numpy as np\n");
        assert_eq!(map["os"].qualified_name, "os");
        assert_eq!(map["np"].qualified_name, "numpy");
        assert_eq!(map["np"].symbol, "numpy");
    }

    #[test]
    fn dotted_import_binds_root_and_full_path() {
        let map = imports_of("import os.path\n");
        assert_eq!(map["os"].qualified_name, "os");
        assert_eq!(map["os.path"].qualified_name, "os.path");
    }

    #[test]
    fn from_import_with_alias_keeps_original_symbol() {
        let map = imports_of("from handlers import ErrorHandler as EH\n");
        let binding = &map["EH"];
        assert_eq!(binding.qualified_name, "handlers.ErrorHandler");
        assert_eq!(binding.symbol, "ErrorHandler");
        assert_eq!(binding.type_name(), "ErrorHandler");
        assert!(!map.contains_key("ErrorHandler"));
    }

    #[test]
    fn relative_imports_preserve_dots() {
        let map = imports_of("from . import sibling\nfrom ..pkg.mod import Thing\n");
        assert_eq!(map["sibling"].qualified_name, ".sibling");
        assert_eq!(map["Thing"].qualified_name, "..pkg.mod.Thing");
    }

    #[test]
    fn wildcard_imports_contribute_nothing() {
        let map = imports_of("from helpers import *\n");
        assert!(map.is_empty());
    }

    #[test]
    fn function_local_imports_are_ignored() {
        let map = imports_of("def f():\n    import json\n    return json\n");
        assert!(map.is_empty());
    }

    #[test]
    fn statement_bindings_keep_source_order() {
        let src = "from m import zeta, alpha as a\n";
        let tree = parse_source(src).unwrap();
        let statement = tree.root_node().child(0).unwrap();
        let locals: Vec<String> = statement_bindings(&statement, src.as_bytes())
            .into_iter()
            .map(|(local, _)| local)
            .collect();
        assert_eq!(locals, vec!["zeta", "a"]);
    }

    #[test]
    fn guarded_module_imports_count() {
        let src = "try:\n    import ujson as json\nexcept ImportError:\n    import json\n";
        let map = imports_of(src);
        // Later binding wins, as at runtime on the fallback path.
        assert_eq!(map["json"].qualified_name, "json");
    }
}
