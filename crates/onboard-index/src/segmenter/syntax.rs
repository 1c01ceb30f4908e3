//! Construct detection from tree-sitter syntax trees.

use tree_sitter::{Node, Parser};

use super::Construct;
use crate::chunk::ChunkKind;
use crate::error::StructuralError;
use crate::languages::Lang;

/// Deeper nodes are not searched for nested constructs.
const MAX_DEPTH: usize = 48;

/// Parse `source` and return its top-level constructs with nested children.
pub(super) fn constructs(lang: Lang, source: &str) -> Result<Vec<Construct>, StructuralError> {
    let grammar = lang
        .grammar()
        .ok_or(StructuralError::GrammarMissing(lang.id()))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|_| StructuralError::GrammarMissing(lang.id()))?;

    let tree = parser.parse(source, None).ok_or(StructuralError::NoTree)?;
    let root = tree.root_node();
    let found = collect(lang, source, &root, 0);

    if found.is_empty() && root.has_error() {
        return Err(StructuralError::Malformed);
    }
    if root.has_error() {
        tracing::debug!(
            language = %lang,
            constructs = found.len(),
            "syntax tree contains errors, keeping recovered constructs"
        );
    }
    Ok(found)
}

/// Constructs among the descendants of `node`, outermost first.
fn collect(lang: Lang, source: &str, node: &Node, depth: usize) -> Vec<Construct> {
    let mut out = Vec::new();
    if depth >= MAX_DEPTH {
        return out;
    }
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        match construct_for(lang, source, &child, depth) {
            Some(construct) => out.push(construct),
            None => out.extend(collect(lang, source, &child, depth + 1)),
        }
    }
    out
}

fn construct_for(lang: Lang, source: &str, node: &Node, depth: usize) -> Option<Construct> {
    let (kind, def) = classify(lang, node)?;
    let body = body_of(&def);
    let end = end_row(node);

    let mut breakpoints = Vec::new();
    let child_count = u32::try_from(body.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        if let Some(stmt) = body.named_child(i) {
            let row = end_row(&stmt);
            if row < end {
                breakpoints.push(row);
            }
        }
    }

    Some(Construct {
        start: node.start_position().row,
        end,
        kind,
        name: entity_name(&def, source),
        children: collect(lang, source, &body, depth + 1),
        breakpoints,
    })
}

/// Map a node to a construct kind and the node that carries its name and body.
fn classify<'t>(lang: Lang, node: &Node<'t>) -> Option<(ChunkKind, Node<'t>)> {
    let kind = node.kind();
    match lang {
        Lang::Rust => match kind {
            "function_item" | "function_signature_item" | "macro_definition" => {
                Some((ChunkKind::Function, *node))
            }
            "impl_item" | "trait_item" | "struct_item" | "enum_item" | "union_item" => {
                Some((ChunkKind::Class, *node))
            }
            "mod_item" if node.child_by_field_name("body").is_some() => {
                Some((ChunkKind::Class, *node))
            }
            _ => None,
        },
        Lang::Python => match kind {
            "function_definition" => Some((ChunkKind::Function, *node)),
            "class_definition" => Some((ChunkKind::Class, *node)),
            "decorated_definition" => node
                .child_by_field_name("definition")
                .and_then(|def| classify(lang, &def)),
            _ => None,
        },
        Lang::JavaScript | Lang::TypeScript => match kind {
            "function_declaration"
            | "generator_function_declaration"
            | "method_definition"
            | "function_signature" => Some((ChunkKind::Function, *node)),
            "class_declaration"
            | "abstract_class_declaration"
            | "interface_declaration"
            | "enum_declaration" => Some((ChunkKind::Class, *node)),
            "export_statement" => node
                .child_by_field_name("declaration")
                .and_then(|decl| classify(lang, &decl)),
            "lexical_declaration" | "variable_declaration" => function_declarator(node),
            _ => None,
        },
        Lang::Go => match kind {
            "function_declaration" | "method_declaration" => Some((ChunkKind::Function, *node)),
            "type_declaration" => Some((ChunkKind::Class, *node)),
            _ => None,
        },
        _ => None,
    }
}

/// `const handler = () => { ... }` and friends.
fn function_declarator<'t>(node: &Node<'t>) -> Option<(ChunkKind, Node<'t>)> {
    let child_count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..child_count)
        .filter_map(|i| node.named_child(i))
        .filter(|d| d.kind() == "variable_declarator")
        .find(|d| {
            d.child_by_field_name("value").is_some_and(|v| {
                matches!(
                    v.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
            })
        })
        .map(|d| (ChunkKind::Function, d))
}

fn body_of<'t>(def: &Node<'t>) -> Node<'t> {
    def.child_by_field_name("body")
        .or_else(|| {
            def.child_by_field_name("value")
                .and_then(|v| v.child_by_field_name("body"))
        })
        .unwrap_or(*def)
}

fn entity_name(node: &Node, source: &str) -> Option<String> {
    // impl_item names its subject via the "type" field; Go type_declaration
    // nests the name in its first type_spec
    node.child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .or_else(|| {
            node.named_child(0)
                .filter(|c| c.kind() == "type_spec")
                .and_then(|spec| spec.child_by_field_name("name"))
        })
        .and_then(|n| source.get(n.byte_range()))
        .map(str::to_owned)
}

/// Last row a node occupies; a node ending at column 0 ends on the row before.
fn end_row(node: &Node) -> usize {
    let start = node.start_position().row;
    let end = node.end_position();
    if end.column == 0 && end.row > start {
        end.row - 1
    } else {
        end.row
    }
}
