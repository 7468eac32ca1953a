//! Local assignment type tracking.

use std::collections::BTreeMap;

use tree_sitter::Node;

use super::annotations::normalize_annotation;
use super::imports::ImportMap;
use super::{last_segment, node_text};

/// Walk one scope once, in source order, recording the type each local name
/// was last assigned (last write wins).
///
/// `scope` is a module root, a class body or a function body. Nested function
/// and class definitions are separate scopes and are not entered.
///
/// Tracked forms: `x = Class(...)`, `x: T = ...`, `(x := Class(...))`,
/// `with Class(...) as x`, and `self.attr = Class(...)` / `cls.attr = ...`
/// keyed as `self.attr` / `cls.attr`. Subscript targets and augmented
/// assignments are not tracked. Any call counts as a constructor, so a
/// factory call types the variable with the factory's own name.
pub fn track_assignments(scope: &Node, source: &[u8], imports: &ImportMap) -> BTreeMap<String, String> {
    let mut types = BTreeMap::new();
    for i in 0..scope.child_count() {
        if let Some(child) = scope.child(i) {
            walk(&child, source, imports, &mut types);
        }
    }
    types
}

fn walk(node: &Node, source: &[u8], imports: &ImportMap, types: &mut BTreeMap<String, String>) {
    match node.kind() {
        "function_definition" | "class_definition" | "decorated_definition" | "lambda" => return,
        "assignment" => record_assignment(node, source, imports, types),
        "named_expression" => {
            if let (Some(name), Some(value)) = (
                node.child_by_field_name("name"),
                node.child_by_field_name("value"),
            ) {
                if let Some(ty) = constructed_type(&value, source, imports) {
                    types.insert(node_text(&name, source).to_string(), ty);
                }
            }
        }
        "with_item" => record_with_item(node, source, imports, types),
        "augmented_assignment" => return,
        _ => {}
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(&child, source, imports, types);
        }
    }
}

fn record_assignment(
    node: &Node,
    source: &[u8],
    imports: &ImportMap,
    types: &mut BTreeMap<String, String>,
) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    let Some(key) = target_key(&left, source) else {
        return;
    };

    let annotated = node
        .child_by_field_name("type")
        .and_then(|t| normalize_annotation(node_text(&t, source)));

    let constructed = || {
        // `a = b = Foo()` nests the second assignment as the right side.
        let mut right = node.child_by_field_name("right")?;
        while right.kind() == "assignment" {
            right = right.child_by_field_name("right")?;
        }
        constructed_type(&right, source, imports)
    };

    if let Some(ty) = annotated.or_else(constructed) {
        types.insert(key, ty);
    }
}

fn record_with_item(
    node: &Node,
    source: &[u8],
    imports: &ImportMap,
    types: &mut BTreeMap<String, String>,
) {
    let Some(value) = node.child_by_field_name("value") else {
        return;
    };
    if value.kind() != "as_pattern" {
        return;
    }
    let (Some(expr), Some(alias)) = (value.named_child(0), value.child_by_field_name("alias"))
    else {
        return;
    };
    let target = if alias.kind() == "as_pattern_target" {
        match alias.named_child(0) {
            Some(t) => t,
            None => return,
        }
    } else {
        alias
    };
    if let (Some(key), Some(ty)) = (
        target_key(&target, source),
        constructed_type(&expr, source, imports),
    ) {
        types.insert(key, ty);
    }
}

/// Key under which an assignment target is tracked.
fn target_key(target: &Node, source: &[u8]) -> Option<String> {
    match target.kind() {
        "identifier" => Some(node_text(target, source).to_string()),
        "attribute" => {
            let object = target.child_by_field_name("object")?;
            let attr = target.child_by_field_name("attribute")?;
            let owner = node_text(&object, source);
            if object.kind() == "identifier" && (owner == "self" || owner == "cls") {
                Some(format!("{owner}.{}", node_text(&attr, source)))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Type produced by a call expression used as an assignment value.
///
/// `Class(...)` -> `Class`, `module.Class(...)` -> `Class`, and an aliased
/// import resolves to the original imported name.
pub fn constructed_type(value: &Node, source: &[u8], imports: &ImportMap) -> Option<String> {
    if value.kind() != "call" {
        return None;
    }
    let function = value.child_by_field_name("function")?;
    match function.kind() {
        "identifier" => {
            let name = node_text(&function, source);
            match imports.get(name) {
                Some(binding) => Some(binding.type_name().to_string()),
                None => Some(name.to_string()),
            }
        }
        "attribute" => {
            let attr = function.child_by_field_name("attribute")?;
            Some(last_segment(node_text(&attr, source)).to_string())
        }
        _ => None,
    }
}
