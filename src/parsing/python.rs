//! Python extractor.
//!
//! Walks the tree-sitter CST directly; byte ranges slice straight into the
//! source so spans come out verbatim. Methods are emitted as functions with
//! `class_context` set, nested defs with `function_context` set.

use tree_sitter::{Node, Parser};

use crate::error::{ParseError, ParseResult};
use crate::parsing::extractor::{MAX_TREE_DEPTH, node_lines, node_text};
use crate::parsing::record::{
    CallRecord, CallerContext, CallerKind, ClassRecord, FileRecordBuilder, FunctionRecord,
    ImportRecord, VariableRecord,
};
use crate::parsing::{Language, LanguageExtractor};

pub struct PythonExtractor {
    parser: Parser,
}

impl PythonExtractor {
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::GrammarInit {
                language: "python".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { parser })
    }

    fn parse_tree(&mut self, source: &str) -> Option<tree_sitter::Tree> {
        self.parser.parse(source, None)
    }
}

impl LanguageExtractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn find_imports(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parse_tree(source) else {
            return;
        };
        collect_imports(tree.root_node(), source, out, 0);
    }

    fn find_functions(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parse_tree(source) else {
            return;
        };
        collect_functions(tree.root_node(), source, out, None, None, 0);
    }

    fn find_classes(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parse_tree(source) else {
            return;
        };
        collect_classes(tree.root_node(), source, out, 0);
    }

    fn find_calls(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parse_tree(source) else {
            return;
        };
        let mut bindings = Vec::new();
        collect_calls(tree.root_node(), source, out, &mut bindings, 0);
    }

    fn find_variables(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parse_tree(source) else {
            return;
        };
        // Module-level assignments only.
        for child in tree.root_node().children(&mut tree.root_node().walk()) {
            if child.kind() != "expression_statement" {
                continue;
            }
            let Some(expr) = child.child(0) else { continue };
            if expr.kind() != "assignment" {
                continue;
            }
            let Some(left) = expr.child_by_field_name("left") else {
                continue;
            };
            if left.kind() != "identifier" {
                continue;
            }
            let (line_number, end_line) = node_lines(&child);
            out.add_variable(VariableRecord {
                name: node_text(&left, source).to_string(),
                line_number,
                end_line,
                source: node_text(&child, source).trim_end().to_string(),
            });
        }
    }
}

fn collect_imports(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "import_statement" => {
            // import a.b, c as d
            for child in node.named_children(&mut node.walk()) {
                match child.kind() {
                    "dotted_name" => {
                        out.add_import(ImportRecord {
                            module: node_text(&child, source).to_string(),
                            alias: None,
                            imported_name: None,
                            line_number: node.start_position().row as u32 + 1,
                            is_from_import: false,
                        });
                    }
                    "aliased_import" => {
                        let module = child
                            .child_by_field_name("name")
                            .map(|n| node_text(&n, source).to_string())
                            .unwrap_or_default();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|n| node_text(&n, source).to_string());
                        out.add_import(ImportRecord {
                            module,
                            alias,
                            imported_name: None,
                            line_number: node.start_position().row as u32 + 1,
                            is_from_import: false,
                        });
                    }
                    _ => {}
                }
            }
        }
        "import_from_statement" => {
            // from a.b import c as d, e
            let module = node
                .child_by_field_name("module_name")
                .map(|n| node_text(&n, source).to_string())
                .unwrap_or_default();
            let line_number = node.start_position().row as u32 + 1;
            let mut saw_name = false;
            for child in node.named_children(&mut node.walk()) {
                // The module itself also shows up as a dotted_name child;
                // names come after the `import` keyword, so skip the module
                // node by byte range.
                if Some(child) == node.child_by_field_name("module_name") {
                    continue;
                }
                match child.kind() {
                    "dotted_name" | "identifier" => {
                        saw_name = true;
                        out.add_import(ImportRecord {
                            module: module.clone(),
                            alias: None,
                            imported_name: Some(node_text(&child, source).to_string()),
                            line_number,
                            is_from_import: true,
                        });
                    }
                    "aliased_import" => {
                        saw_name = true;
                        let imported = child
                            .child_by_field_name("name")
                            .map(|n| node_text(&n, source).to_string());
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|n| node_text(&n, source).to_string());
                        out.add_import(ImportRecord {
                            module: module.clone(),
                            alias,
                            imported_name: imported,
                            line_number,
                            is_from_import: true,
                        });
                    }
                    "wildcard_import" => {
                        saw_name = true;
                        out.add_import(ImportRecord {
                            module: module.clone(),
                            alias: None,
                            imported_name: Some("*".to_string()),
                            line_number,
                            is_from_import: true,
                        });
                    }
                    _ => {}
                }
            }
            if !saw_name && !module.is_empty() {
                out.add_import(ImportRecord {
                    module,
                    alias: None,
                    imported_name: None,
                    line_number,
                    is_from_import: true,
                });
            }
        }
        _ => {
            for child in node.children(&mut node.walk()) {
                collect_imports(child, source, out, depth + 1);
            }
        }
    }
}

fn collect_functions(
    node: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    class_context: Option<&str>,
    function_context: Option<&str>,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "function_definition" => {
            let Some(name_node) = node.child_by_field_name("name") else {
                return;
            };
            let name = node_text(&name_node, source).to_string();
            let (line_number, end_line) = definition_span(&node);
            let source_span = definition_text(&node, source);

            out.add_function(FunctionRecord {
                name: name.clone(),
                line_number,
                end_line,
                args: parameter_names(&node, source),
                decorators: decorator_names(&node, source),
                docstring: body_docstring(&node, source),
                source: source_span,
                class_context: class_context.map(str::to_string),
                function_context: function_context.map(str::to_string),
                visibility: Some(python_visibility(&name)),
                cyclomatic_complexity: cyclomatic_complexity(&node),
            });

            if let Some(body) = node.child_by_field_name("body") {
                for child in body.children(&mut body.walk()) {
                    collect_functions(child, source, out, None, Some(&name), depth + 1);
                }
            }
        }
        "class_definition" => {
            let class_name = node
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string());
            if let (Some(class_name), Some(body)) =
                (class_name, node.child_by_field_name("body"))
            {
                for child in body.children(&mut body.walk()) {
                    collect_functions(child, source, out, Some(&class_name), None, depth + 1);
                }
            }
        }
        _ => {
            for child in node.children(&mut node.walk()) {
                collect_functions(child, source, out, class_context, function_context, depth + 1);
            }
        }
    }
}

fn collect_classes(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "class_definition" {
        if let Some(name_node) = node.child_by_field_name("name") {
            let (line_number, end_line) = definition_span(&node);
            let bases = node
                .child_by_field_name("superclasses")
                .map(|args| {
                    args.named_children(&mut args.walk())
                        .filter(|n| {
                            matches!(n.kind(), "identifier" | "attribute" | "subscript")
                        })
                        .map(|n| node_text(&n, source).to_string())
                        .collect()
                })
                .unwrap_or_default();

            out.add_class(ClassRecord {
                name: node_text(&name_node, source).to_string(),
                line_number,
                end_line,
                bases,
                implements: Vec::new(),
                decorators: decorator_names(&node, source),
                docstring: body_docstring(&node, source),
                source: definition_text(&node, source),
            });
        }
    }
    for child in node.children(&mut node.walk()) {
        collect_classes(child, source, out, depth + 1);
    }
}

/// Local `name = ClassName(...)` bindings visible at this point of the walk.
/// A plain Vec works as a scope stack: entries pushed inside a function are
/// truncated away when the function ends.
type Bindings = Vec<(String, String)>;

fn collect_calls(
    node: Node,
    source: &str,
    out: &mut FileRecordBuilder,
    bindings: &mut Bindings,
    depth: usize,
) {
    if depth > MAX_TREE_DEPTH {
        return;
    }

    if node.kind() == "assignment" {
        record_binding(&node, source, bindings);
    }

    if node.kind() == "call" {
        if let Some(function) = node.child_by_field_name("function") {
            let full_name = node_text(&function, source).to_string();
            let name = full_name
                .rsplit('.')
                .next()
                .unwrap_or(&full_name)
                .to_string();

            // Receiver type hint for `x.method()` where x was bound locally.
            let inferred_obj_type = full_name.split_once('.').and_then(|(base, _)| {
                bindings
                    .iter()
                    .rev()
                    .find(|(var, _)| var == base)
                    .map(|(_, ty)| ty.clone())
            });

            out.add_call(CallRecord {
                name,
                full_name,
                line_number: node.start_position().row as u32 + 1,
                args: call_arguments(&node, source),
                caller: enclosing_caller(&node, source),
                inferred_obj_type,
            });
        }
    }

    let scope_mark = if node.kind() == "function_definition" {
        Some(bindings.len())
    } else {
        None
    };

    for child in node.children(&mut node.walk()) {
        collect_calls(child, source, out, bindings, depth + 1);
    }

    if let Some(mark) = scope_mark {
        bindings.truncate(mark);
    }
}

fn record_binding(node: &Node, source: &str, bindings: &mut Bindings) {
    let (Some(left), Some(right)) = (
        node.child_by_field_name("left"),
        node.child_by_field_name("right"),
    ) else {
        return;
    };
    if left.kind() != "identifier" || right.kind() != "call" {
        return;
    }
    let Some(callee) = right.child_by_field_name("function") else {
        return;
    };
    if callee.kind() != "identifier" {
        return;
    }
    let type_name = node_text(&callee, source);
    // Constructor calls only: type names start uppercase by convention.
    if type_name.chars().next().is_some_and(char::is_uppercase) {
        bindings.push((
            node_text(&left, source).to_string(),
            type_name.to_string(),
        ));
    }
}

/// Innermost enclosing function wins; a bare class body falls back to the
/// class itself.
fn enclosing_caller(node: &Node, source: &str) -> Option<CallerContext> {
    let mut current = node.parent();
    let mut class_fallback = None;
    while let Some(parent) = current {
        match parent.kind() {
            "function_definition" => {
                let name = parent.child_by_field_name("name")?;
                let (line, _) = definition_span(&parent);
                return Some(CallerContext {
                    name: node_text(&name, source).to_string(),
                    kind: CallerKind::Function,
                    line_number: line,
                });
            }
            "class_definition" => {
                if class_fallback.is_none() {
                    if let Some(name) = parent.child_by_field_name("name") {
                        let (line, _) = definition_span(&parent);
                        class_fallback = Some(CallerContext {
                            name: node_text(&name, source).to_string(),
                            kind: CallerKind::Class,
                            line_number: line,
                        });
                    }
                }
            }
            _ => {}
        }
        current = parent.parent();
    }
    class_fallback
}

/// Span of the definition including its decorators, so line_number matches
/// what a reader sees as the start of the declaration block.
fn definition_span(node: &Node) -> (u32, u32) {
    let anchor = decorated_root(node);
    let (start, _) = node_lines(&anchor);
    let (_, end) = node_lines(node);
    (start, end)
}

fn definition_text(node: &Node, source: &str) -> String {
    let anchor = decorated_root(node);
    source[anchor.start_byte()..node.end_byte()].to_string()
}

fn decorated_root<'t>(node: &Node<'t>) -> Node<'t> {
    match node.parent() {
        Some(p) if p.kind() == "decorated_definition" => p,
        _ => *node,
    }
}

fn decorator_names(node: &Node, source: &str) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }
    parent
        .children(&mut parent.walk())
        .filter(|c| c.kind() == "decorator")
        .map(|c| node_text(&c, source).trim_start_matches('@').to_string())
        .collect()
}

fn parameter_names(node: &Node, source: &str) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for param in params.named_children(&mut params.walk()) {
        match param.kind() {
            "identifier" => names.push(node_text(&param, source).to_string()),
            "typed_parameter" | "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param
                    .child_by_field_name("name")
                    .or_else(|| param.named_child(0).filter(|n| n.kind() == "identifier"))
                {
                    names.push(node_text(&name, source).to_string());
                }
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                names.push(node_text(&param, source).to_string());
            }
            _ => {}
        }
    }
    names
}

fn body_docstring(node: &Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }
    let raw = node_text(&literal, source);
    Some(strip_string_quotes(raw))
}

fn strip_string_quotes(raw: &str) -> String {
    let trimmed = raw
        .trim_start_matches(['r', 'b', 'u', 'f', 'R', 'B', 'U', 'F'])
        .trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn call_arguments(node: &Node, source: &str) -> Vec<String> {
    let Some(args) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    args.named_children(&mut args.walk())
        .map(|a| node_text(&a, source).to_string())
        .collect()
}

/// Decision points + 1. Counted syntactically over branch/loop/handler nodes.
fn cyclomatic_complexity(node: &Node) -> u32 {
    let mut count = 1;
    count_branches(node, &mut count, 0);
    count
}

fn count_branches(node: &Node, count: &mut u32, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    match node.kind() {
        "if_statement" | "elif_clause" | "while_statement" | "for_statement"
        | "except_clause" | "conditional_expression" | "boolean_operator" => *count += 1,
        _ => {}
    }
    for child in node.children(&mut node.walk()) {
        count_branches(&child, count, depth + 1);
    }
}

fn python_visibility(name: &str) -> String {
    if name.starts_with('_') {
        "private".to_string()
    } else {
        "public".to_string()
    }
}
