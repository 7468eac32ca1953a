//! Parameter type annotations -> normalised type names.

use std::collections::BTreeMap;

use tree_sitter::Node;

use super::{last_segment, node_text};

/// Containers whose first type argument is the useful receiver type.
const PEELABLE: &[&str] = &[
    "Optional", "List", "Set", "Tuple", "Sequence", "Iterator", "Type", "list", "set", "tuple",
    "type",
];

/// Annotations that name no concrete class.
const OPAQUE: &[&str] = &["None", "Any", "object"];

/// Normalise an annotation to a bare class name.
///
/// `Optional[T]`, `List[T]` and friends peel exactly one level; `Union[T, None]`
/// and `T | None` pick the first non-None member; forward references and
/// qualified names reduce to the bare class. Mapping and callable containers
/// (anything else subscripted) are unresolvable.
pub fn normalize_annotation(annotation: &str) -> Option<String> {
    let text = strip_quotes(annotation.trim());

    let members = split_top_level(text, '|');
    if members.len() > 1 {
        return members
            .into_iter()
            .find(|m| strip_quotes(m) != "None")
            .and_then(simple_name);
    }

    let Some(open) = text.find('[') else {
        return simple_name(text);
    };
    let close = text.rfind(']')?;
    if close < open {
        return None;
    }
    let container = last_segment(text[..open].trim());
    let args = split_top_level(&text[open + 1..close], ',');

    if container == "Union" {
        return args
            .into_iter()
            .find(|a| strip_quotes(a) != "None")
            .and_then(simple_name);
    }
    if PEELABLE.contains(&container) {
        return args.into_iter().next().and_then(simple_name);
    }
    None
}

/// Bare class name of a non-generic annotation.
fn simple_name(text: &str) -> Option<String> {
    let text = strip_quotes(text.trim());
    if text.is_empty() || text.contains('[') || text.contains('|') {
        return None;
    }
    let name = last_segment(text);
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid || OPAQUE.contains(&name) {
        return None;
    }
    Some(name.to_string())
}

fn strip_quotes(text: &str) -> &str {
    let t = text.trim();
    for q in ['"', '\''] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return t[1..t.len() - 1].trim();
        }
    }
    t
}

/// Split on `sep` outside brackets.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() || parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// Map each annotated parameter of `function` to its normalised type.
///
/// Covers positional, keyword-only, positional-only, `*args` and `**kwargs`
/// parameters. Unannotated or unresolvable parameters are absent.
pub fn resolve_parameter_types(function: &Node, source: &[u8]) -> BTreeMap<String, String> {
    let mut types = BTreeMap::new();
    let Some(params) = function.child_by_field_name("parameters") else {
        return types;
    };
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        let (name, annotation) = match param.kind() {
            "typed_parameter" => {
                let Some(annotation) = param.child_by_field_name("type") else {
                    continue;
                };
                let Some(target) = param.named_child(0) else {
                    continue;
                };
                (splat_name(&target, source), annotation)
            }
            "typed_default_parameter" => {
                let (Some(name), Some(annotation)) = (
                    param.child_by_field_name("name"),
                    param.child_by_field_name("type"),
                ) else {
                    continue;
                };
                (Some(node_text(&name, source).to_string()), annotation)
            }
            _ => continue,
        };
        let Some(name) = name else {
            continue;
        };
        if let Some(ty) = normalize_annotation(node_text(&annotation, source)) {
            types.insert(name, ty);
        }
    }
    types
}

/// Parameter name, looking through `*args` / `**kwargs` patterns.
fn splat_name(node: &Node, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "list_splat_pattern" | "dictionary_splat_pattern" => {
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "identifier");
            inner.map(|c| node_text(&c, source).to_string())
        }
        _ => None,
    }
}

/// Normalised return annotation of `function`, if any.
pub fn resolve_return_type(function: &Node, source: &[u8]) -> Option<String> {
    let annotation = function.child_by_field_name("return_type")?;
    normalize_annotation(node_text(&annotation, source))
}
