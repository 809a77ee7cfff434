//! Go extractor.
//!
//! Methods surface with their receiver type as `class_context`, so struct
//! methods land under the struct node the same way class methods do in the
//! other languages.

use tree_sitter::{Node, Parser};

use crate::error::{ParseError, ParseResult};
use crate::parsing::extractor::{MAX_TREE_DEPTH, node_lines, node_text};
use crate::parsing::record::{
    CallRecord, CallerContext, CallerKind, ClassRecord, FileRecordBuilder, FunctionRecord,
    ImportRecord, VariableRecord,
};
use crate::parsing::{Language, LanguageExtractor};

pub struct GoExtractor {
    parser: Parser,
}

impl GoExtractor {
    pub fn new() -> ParseResult<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|e| ParseError::GrammarInit {
                language: "go".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { parser })
    }
}

impl LanguageExtractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn find_imports(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        for node in tree.root_node().children(&mut tree.root_node().walk()) {
            if node.kind() != "import_declaration" {
                continue;
            }
            collect_import_specs(node, source, out);
        }
    }

    fn find_functions(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        for node in tree.root_node().children(&mut tree.root_node().walk()) {
            match node.kind() {
                "function_declaration" => {
                    if let Some(name_node) = node.child_by_field_name("name") {
                        emit_function(&node, source, out, node_text(&name_node, source), None);
                    }
                }
                "method_declaration" => {
                    if let Some(name_node) = node.child_by_field_name("name") {
                        let receiver = receiver_type(&node, source);
                        emit_function(
                            &node,
                            source,
                            out,
                            node_text(&name_node, source),
                            receiver.as_deref(),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn find_classes(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        collect_type_decls(tree.root_node(), source, out, 0);
    }

    fn find_calls(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        collect_calls(tree.root_node(), source, out, 0);
    }

    fn find_variables(&mut self, source: &str, out: &mut FileRecordBuilder) {
        let Some(tree) = self.parser.parse(source, None) else {
            return;
        };
        for node in tree.root_node().children(&mut tree.root_node().walk()) {
            if !matches!(node.kind(), "var_declaration" | "const_declaration") {
                continue;
            }
            collect_var_specs(node, source, out);
        }
    }
}

fn collect_import_specs(decl: Node, source: &str, out: &mut FileRecordBuilder) {
    let line_of = |n: &Node| n.start_position().row as u32 + 1;
    let mut emit = |spec: Node| {
        let Some(path) = spec.child_by_field_name("path") else {
            return;
        };
        let module = node_text(&path, source).trim_matches('"').to_string();
        let alias = spec
            .child_by_field_name("name")
            .filter(|n| n.kind() == "package_identifier")
            .map(|n| node_text(&n, source).to_string());
        out.add_import(ImportRecord {
            module,
            alias,
            imported_name: None,
            line_number: line_of(&spec),
            is_from_import: false,
        });
    };

    for child in decl.children(&mut decl.walk()) {
        match child.kind() {
            "import_spec" => emit(child),
            "import_spec_list" => {
                for spec in child.named_children(&mut child.walk()) {
                    if spec.kind() == "import_spec" {
                        emit(spec);
                    }
                }
            }
            _ => {}
        }
    }
}

fn emit_function(
    node: &Node,
    source: &str,
    out: &mut FileRecordBuilder,
    name: &str,
    receiver: Option<&str>,
) {
    let (line_number, end_line) = node_lines(node);
    out.add_function(FunctionRecord {
        name: name.to_string(),
        line_number,
        end_line,
        args: parameter_names(node, source),
        decorators: Vec::new(),
        docstring: leading_comment(node, source),
        source: node_text(node, source).to_string(),
        class_context: receiver.map(str::to_string),
        function_context: None,
        visibility: Some(go_visibility(name)),
        cyclomatic_complexity: cyclomatic_complexity(node),
    });
}

/// `func (s *Server) Run()` → `Server`.
fn receiver_type(node: &Node, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let param = receiver.named_child(0)?;
    let ty = param.child_by_field_name("type")?;
    let raw = node_text(&ty, source);
    let cleaned = raw
        .trim_start_matches('*')
        .rsplit('.')
        .next()
        .unwrap_or(raw)
        .split('[')
        .next()
        .unwrap_or(raw);
    Some(cleaned.to_string())
}

fn collect_type_decls(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "type_declaration" {
        for spec in node.named_children(&mut node.walk()) {
            if spec.kind() != "type_spec" {
                continue;
            }
            let (Some(name_node), Some(ty)) = (
                spec.child_by_field_name("name"),
                spec.child_by_field_name("type"),
            ) else {
                continue;
            };
            let (line_number, end_line) = node_lines(&node);
            let record = ClassRecord {
                name: node_text(&name_node, source).to_string(),
                line_number,
                end_line,
                bases: Vec::new(),
                implements: Vec::new(),
                decorators: Vec::new(),
                docstring: leading_comment(&node, source),
                source: node_text(&node, source).to_string(),
            };
            match ty.kind() {
                "struct_type" => {
                    out.add_struct(record);
                }
                "interface_type" => {
                    out.add_interface(record);
                }
                _ => {}
            }
        }
    }
    for child in node.children(&mut node.walk()) {
        collect_type_decls(child, source, out, depth + 1);
    }
}

fn collect_calls(node: Node, source: &str, out: &mut FileRecordBuilder, depth: usize) {
    if depth > MAX_TREE_DEPTH {
        return;
    }
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            let full_name = node_text(&function, source).to_string();
            let name = full_name
                .rsplit('.')
                .next()
                .unwrap_or(&full_name)
                .to_string();
            out.add_call(CallRecord {
                name,
                full_name,
                line_number: node.start_position().row as u32 + 1,
                args: call_arguments(&node, source),
                caller: enclosing_caller(&node, source),
                inferred_obj_type: None,
            });
        }
    }
    for child in node.children(&mut node.walk()) {
        collect_calls(child, source, out, depth + 1);
    }
}

fn collect_var_specs(decl: Node, source: &str, out: &mut FileRecordBuilder) {
    let mut emit_names = |spec: Node| {
        if let Some(name) = spec.child_by_field_name("name") {
            let (line_number, end_line) = node_lines(&spec);
            out.add_variable(VariableRecord {
                name: node_text(&name, source).to_string(),
                line_number,
                end_line,
                source: node_text(&spec, source).trim_end().to_string(),
            });
        }
    };
    for child in decl.children(&mut decl.walk()) {
        match child.kind() {
            "var_spec" | "const_spec" => emit_names(child),
            "var_spec_list" | "const_spec_list" => {
                for spec in child.named_children(&mut child.walk()) {
                    if matches!(spec.kind(), "var_spec" | "const_spec") {
                        emit_names(spec);
                    }
                }
            }
            _ => {}
        }
    }
}

fn enclosing_caller(node: &Node, source: &str) -> Option<CallerContext> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if matches!(
            parent.kind(),
            "function_declaration" | "method_declaration"
        ) {
            let name = parent.child_by_field_name("name")?;
            return Some(CallerContext {
                name: node_text(&name, source).to_string(),
                kind: CallerKind::Function,
                line_number: parent.start_position().row as u32 + 1,
            });
        }
        current = parent.parent();
    }
    None
}

fn parameter_names(node: &Node, source: &str) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for param in params.named_children(&mut params.walk()) {
        if param.kind() != "parameter_declaration" {
            continue;
        }
        for child in param.children(&mut param.walk()) {
            if child.kind() == "identifier" {
                names.push(node_text(&child, source).to_string());
            }
        }
    }
    names
}

fn call_arguments(node: &Node, source: &str) -> Vec<String> {
    let Some(args) = node.child_by_field_name("arguments") else {
        return Vec::new();
    };
    args.named_children(&mut args.walk())
        .map(|a| node_text(&a, source).to_string())
        .collect()
}

/// Contiguous `//` comment block ending on the line above the declaration.
fn leading_comment(node: &Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut prev = node.prev_sibling();
    let mut expected_row = node.start_position().row;
    while let Some(p) = prev {
        if p.kind() != "comment" || p.end_position().row + 1 != expected_row {
            break;
        }
        lines.push(
            node_text(&p, source)
                .trim_start_matches("//")
                .trim()
                .to_string(),
        );
        expected_row = p.start_position().row;
        prev = p.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

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
        "if_statement" | "for_statement" | "expression_case" | "type_case"
        | "default_case" | "select_statement" => *count += 1,
        _ => {}
    }
    for child in node.children(&mut node.walk()) {
        count_branches(&child, count, depth + 1);
    }
}

fn go_visibility(name: &str) -> String {
    if name.chars().next().is_some_and(char::is_uppercase) {
        "public".to_string()
    } else {
        "private".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::parsing::ExtractorSet;

    fn parse(source: &str) -> crate::parsing::FileRecord {
        let mut set = ExtractorSet::new(&LimitsConfig::default()).unwrap();
        set.parse_source("m.go", Language::Go, source).unwrap()
    }

    #[test]
    fn imports_grouped_and_aliased() {
        let record = parse(
            "package main\n\nimport (\n\t\"fmt\"\n\tlog \"github.com/rs/zerolog\"\n)\n\nimport \"os\"\n",
        );
        assert_eq!(record.imports.len(), 3);
        assert_eq!(record.imports[0].module, "fmt");
        assert_eq!(record.imports[1].alias.as_deref(), Some("log"));
        assert_eq!(record.imports[2].module, "os");
    }

    #[test]
    fn methods_carry_receiver_as_class_context() {
        let record = parse(
            "package main\n\ntype Server struct{}\n\nfunc (s *Server) Run() {}\n\nfunc helper() {}\n",
        );
        assert_eq!(record.structs.len(), 1);
        let run = record.functions.iter().find(|f| f.name == "Run").unwrap();
        assert_eq!(run.class_context.as_deref(), Some("Server"));
        assert_eq!(run.visibility.as_deref(), Some("public"));
        let helper = record.functions.iter().find(|f| f.name == "helper").unwrap();
        assert!(helper.class_context.is_none());
        assert_eq!(helper.visibility.as_deref(), Some("private"));
    }

    #[test]
    fn interfaces_and_doc_comments() {
        let record = parse(
            "package main\n\n// Store persists things.\n// Thread safe.\ntype Store interface {\n\tGet(key string) string\n}\n",
        );
        assert_eq!(record.interfaces.len(), 1);
        assert_eq!(
            record.interfaces[0].docstring.as_deref(),
            Some("Store persists things.\nThread safe.")
        );
    }

    #[test]
    fn calls_with_selector() {
        let record = parse(
            "package main\n\nfunc run() {\n\tclient.Fetch(url)\n\tdoWork()\n}\n",
        );
        let fetch = record.function_calls.iter().find(|c| c.name == "Fetch").unwrap();
        assert_eq!(fetch.full_name, "client.Fetch");
        assert_eq!(fetch.caller.as_ref().unwrap().name, "run");
        assert!(record.function_calls.iter().any(|c| c.name == "doWork"));
    }

    #[test]
    fn package_level_vars_and_consts() {
        let record = parse(
            "package main\n\nvar limit = 5\n\nconst (\n\tA = 1\n\tB = 2\n)\n\nfunc f() { x := 1; _ = x }\n",
        );
        let names: Vec<_> = record.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["limit", "A", "B"]);
    }
}
